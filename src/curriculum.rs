use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

// Curriculum item ids are library ids prefixed by kind; the prefix keeps the
// two independent library id spaces apart inside one ordered list.
pub const LESSON_PREFIX: &str = "lesson-";
pub const QUIZ_PREFIX: &str = "quiz-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemKind {
    Lesson,
    Quiz,
}

pub fn split_item_id(id: &str) -> Option<(ItemKind, &str)> {
    if let Some(rest) = id.strip_prefix(LESSON_PREFIX) {
        return Some((ItemKind::Lesson, rest));
    }
    if let Some(rest) = id.strip_prefix(QUIZ_PREFIX) {
        return Some((ItemKind::Quiz, rest));
    }
    None
}

pub fn lesson_item_id(library_id: &str) -> String {
    format!("{}{}", LESSON_PREFIX, library_id)
}

pub fn quiz_item_id(library_id: &str) -> String {
    format!("{}{}", QUIZ_PREFIX, library_id)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    pub id: String,
    pub title: String,
    pub free_preview: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub id: String,
    pub title: String,
    pub question_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ItemPayload {
    #[serde(rename_all = "camelCase")]
    Lesson { title: String, free_preview: bool },
    #[serde(rename_all = "camelCase")]
    Quiz { title: String, question_count: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurriculumItem {
    pub id: String,
    #[serde(flatten)]
    pub payload: ItemPayload,
}

impl CurriculumItem {
    pub fn kind(&self) -> ItemKind {
        match self.payload {
            ItemPayload::Lesson { .. } => ItemKind::Lesson,
            ItemPayload::Quiz { .. } => ItemKind::Quiz,
        }
    }

    pub fn title(&self) -> &str {
        match &self.payload {
            ItemPayload::Lesson { title, .. } => title,
            ItemPayload::Quiz { title, .. } => title,
        }
    }
}

// The course document triple as stored. The flat order is canonical, module
// names carry display order, and the assignment map groups ids per module.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CourseCurriculum {
    pub curriculum_order: Vec<String>,
    pub module_names: Vec<String>,
    pub module_assignments: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRef {
    Unassigned,
    Module(String),
}

impl ListRef {
    fn label(&self) -> &str {
        match self {
            Self::Unassigned => "unassigned",
            Self::Module(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurriculumError {
    #[error("unknown module: {0}")]
    UnknownModule(String),
    #[error("index {index} out of range for {list} (len {len})")]
    IndexOutOfRange {
        list: String,
        index: usize,
        len: usize,
    },
    #[error("item already in curriculum: {0}")]
    DuplicateItem(String),
    #[error("item not in curriculum: {0}")]
    ItemNotFound(String),
    #[error("module already exists: {0}")]
    ModuleExists(String),
}

impl CurriculumError {
    // Stable wire code for the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownModule(_) => "unknown_module",
            Self::IndexOutOfRange { .. } => "bad_index",
            Self::DuplicateItem(_) => "duplicate_item",
            Self::ItemNotFound(_) => "not_found",
            Self::ModuleExists(_) => "module_exists",
        }
    }
}

/// Resolve an ordered id list against the libraries. A reference whose record
/// was deleted from its library (or whose prefix is not recognized) is
/// silently dropped; stale references must never break rendering. Output
/// preserves input order.
pub fn resolve(
    order: &[String],
    lessons: &[LessonSummary],
    quizzes: &[QuizSummary],
) -> Vec<CurriculumItem> {
    let lessons_by_id: HashMap<&str, &LessonSummary> =
        lessons.iter().map(|l| (l.id.as_str(), l)).collect();
    let quizzes_by_id: HashMap<&str, &QuizSummary> =
        quizzes.iter().map(|q| (q.id.as_str(), q)).collect();

    let mut out = Vec::with_capacity(order.len());
    for id in order {
        let Some((kind, library_id)) = split_item_id(id) else {
            continue;
        };
        let payload = match kind {
            ItemKind::Lesson => lessons_by_id.get(library_id).map(|l| ItemPayload::Lesson {
                title: l.title.clone(),
                free_preview: l.free_preview,
            }),
            ItemKind::Quiz => quizzes_by_id.get(library_id).map(|q| ItemPayload::Quiz {
                title: q.title.clone(),
                question_count: q.question_count,
            }),
        };
        if let Some(payload) = payload {
            out.push(CurriculumItem {
                id: id.clone(),
                payload,
            });
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleItems {
    pub name: String,
    pub items: Vec<CurriculumItem>,
}

// The derived board: every module group in display order plus the unassigned
// pool. This is what the UI renders and what drag indices address.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub modules: Vec<ModuleItems>,
    pub unassigned: Vec<CurriculumItem>,
}

impl Partition {
    pub fn item_count(&self) -> usize {
        self.unassigned.len() + self.modules.iter().map(|m| m.items.len()).sum::<usize>()
    }

    fn list_mut(&mut self, list: &ListRef) -> Result<&mut Vec<CurriculumItem>, CurriculumError> {
        match list {
            ListRef::Unassigned => Ok(&mut self.unassigned),
            ListRef::Module(name) => self
                .modules
                .iter_mut()
                .find(|m| &m.name == name)
                .map(|m| &mut m.items)
                .ok_or_else(|| CurriculumError::UnknownModule(name.clone())),
        }
    }

    // Remove at `from_index`, insert at `to_index`. A move onto its own position
    // is an exact no-op; for a same-list move the destination index addresses
    // the list after removal, which is how drag libraries report it.
    pub fn move_item(
        &self,
        from: &ListRef,
        from_index: usize,
        to: &ListRef,
        to_index: usize,
    ) -> Result<Partition, CurriculumError> {
        if from == to && from_index == to_index {
            return Ok(self.clone());
        }

        let mut next = self.clone();
        let item = {
            let source = next.list_mut(from)?;
            if from_index >= source.len() {
                return Err(CurriculumError::IndexOutOfRange {
                    list: from.label().to_string(),
                    index: from_index,
                    len: source.len(),
                });
            }
            source.remove(from_index)
        };
        let dest = next.list_mut(to)?;
        if to_index > dest.len() {
            return Err(CurriculumError::IndexOutOfRange {
                list: to.label().to_string(),
                index: to_index,
                len: dest.len(),
            });
        }
        dest.insert(to_index, item);
        Ok(next)
    }

    // Rebuild the stored triple from the board: each module's ids in display
    // order, then the unassigned pool. Empty modules keep an assignment entry.
    pub fn to_course(&self) -> CourseCurriculum {
        let mut curriculum_order = Vec::with_capacity(self.item_count());
        let mut module_names = Vec::with_capacity(self.modules.len());
        let mut module_assignments = BTreeMap::new();
        for group in &self.modules {
            let ids: Vec<String> = group.items.iter().map(|item| item.id.clone()).collect();
            curriculum_order.extend(ids.iter().cloned());
            module_assignments.insert(group.name.clone(), ids);
            module_names.push(group.name.clone());
        }
        curriculum_order.extend(self.unassigned.iter().map(|item| item.id.clone()));
        CourseCurriculum {
            curriculum_order,
            module_names,
            module_assignments,
        }
    }
}

impl CourseCurriculum {
    // Derive the board. A module name without an assignment entry is an empty
    // group, and an id claimed by an earlier module is not repeated by a later
    // one or by the unassigned pool.
    pub fn partition(&self, lessons: &[LessonSummary], quizzes: &[QuizSummary]) -> Partition {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut modules = Vec::with_capacity(self.module_names.len());
        for name in &self.module_names {
            let assigned = self
                .module_assignments
                .get(name)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let mut claimed: Vec<String> = Vec::with_capacity(assigned.len());
            for id in assigned {
                if visited.insert(id.as_str()) {
                    claimed.push(id.clone());
                }
            }
            modules.push(ModuleItems {
                name: name.clone(),
                items: resolve(&claimed, lessons, quizzes),
            });
        }
        let unassigned = resolve(&self.curriculum_order, lessons, quizzes)
            .into_iter()
            .filter(|item| !visited.contains(item.id.as_str()))
            .collect();
        Partition {
            modules,
            unassigned,
        }
    }

    pub fn add_item(&self, item_id: &str) -> Result<CourseCurriculum, CurriculumError> {
        if self.curriculum_order.iter().any(|id| id == item_id) {
            return Err(CurriculumError::DuplicateItem(item_id.to_string()));
        }
        let mut next = self.clone();
        next.curriculum_order.push(item_id.to_string());
        Ok(next)
    }

    pub fn remove_item(&self, item_id: &str) -> Result<CourseCurriculum, CurriculumError> {
        let in_order = self.curriculum_order.iter().any(|id| id == item_id);
        let in_module = self
            .module_assignments
            .values()
            .any(|ids| ids.iter().any(|id| id == item_id));
        if !in_order && !in_module {
            return Err(CurriculumError::ItemNotFound(item_id.to_string()));
        }
        let mut next = self.clone();
        next.curriculum_order.retain(|id| id != item_id);
        for ids in next.module_assignments.values_mut() {
            ids.retain(|id| id != item_id);
        }
        Ok(next)
    }

    pub fn add_module(&self, name: &str) -> Result<CourseCurriculum, CurriculumError> {
        if self.module_names.iter().any(|n| n == name) {
            return Err(CurriculumError::ModuleExists(name.to_string()));
        }
        let mut next = self.clone();
        next.module_names.push(name.to_string());
        Ok(next)
    }

    // Rename keeps the module's position and its assignment list; only the key
    // changes. Names and assignments must be persisted together.
    pub fn rename_module(&self, old: &str, new: &str) -> Result<CourseCurriculum, CurriculumError> {
        let Some(pos) = self.module_names.iter().position(|n| n == old) else {
            return Err(CurriculumError::UnknownModule(old.to_string()));
        };
        if new == old {
            return Ok(self.clone());
        }
        if self.module_names.iter().any(|n| n == new) {
            return Err(CurriculumError::ModuleExists(new.to_string()));
        }
        let mut next = self.clone();
        next.module_names[pos] = new.to_string();
        if let Some(ids) = next.module_assignments.remove(old) {
            next.module_assignments.insert(new.to_string(), ids);
        }
        Ok(next)
    }

    // Dropping a module never drops its items: they stay in the flat order
    // and fall back to the unassigned pool.
    pub fn remove_module(&self, name: &str) -> Result<CourseCurriculum, CurriculumError> {
        if !self.module_names.iter().any(|n| n == name) {
            return Err(CurriculumError::UnknownModule(name.to_string()));
        }
        let mut next = self.clone();
        next.module_names.retain(|n| n != name);
        next.module_assignments.remove(name);
        Ok(next)
    }
}
