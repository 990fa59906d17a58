mod test_support;

use serde_json::{json, Value};
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

fn list_ids(board: &Value, pointer: &str) -> Vec<String> {
    board
        .pointer(pointer)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| item.get("id").and_then(|v| v.as_str()))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn board_item_count(board: &Value) -> usize {
    let in_modules: usize = board
        .get("modules")
        .and_then(|v| v.as_array())
        .map(|mods| {
            mods.iter()
                .filter_map(|m| m.get("items").and_then(|v| v.as_array()))
                .map(|items| items.len())
                .sum()
        })
        .unwrap_or(0);
    let in_pool = board
        .get("unassigned")
        .and_then(|v| v.as_array())
        .map(|arr| arr.len())
        .unwrap_or(0);
    in_modules + in_pool
}

#[test]
fn board_add_move_reorder_and_reopen() {
    let workspace = temp_dir("courseloft-board");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "onboarding.registerCompany",
        json!({
            "brandName": "Acme Learning",
            "ownerEmail": "dana@acmelearning.test",
            "ownerName": "Dana Reyes"
        }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.open",
        json!({ "email": "dana@acmelearning.test" }),
    );

    let l1 = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "lessons.create",
        json!({ "title": "Intro to Safety" }),
    );
    let lesson_a = format!(
        "lesson-{}",
        l1.get("lessonId").and_then(|v| v.as_str()).expect("lessonId")
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "lessons.create",
        json!({ "title": "Working at Heights" }),
    );
    let q1 = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "quizzes.create",
        json!({
            "title": "Safety Check",
            "questions": [
                { "prompt": "Hard hat zone?", "choices": ["Always", "Never"], "answerIndex": 0 },
                { "prompt": "Report hazards to", "choices": ["Nobody", "Supervisor"], "answerIndex": 1 }
            ]
        }),
    );
    let quiz_a = format!(
        "quiz-{}",
        q1.get("quizId").and_then(|v| v.as_str()).expect("quizId")
    );
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "courses.create",
        json!({ "title": "Site Induction" }),
    );
    let course_id = course
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();

    let available = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "curriculum.available",
        json!({ "courseId": course_id }),
    );
    assert_eq!(
        available
            .get("lessons")
            .and_then(|v| v.as_array())
            .map(|arr| arr.len()),
        Some(2)
    );
    assert_eq!(
        available.pointer("/quizzes/0/itemId").and_then(|v| v.as_str()),
        Some(quiz_a.as_str())
    );
    assert_eq!(
        available
            .pointer("/quizzes/0/questionCount")
            .and_then(|v| v.as_i64()),
        Some(2)
    );

    // New references land at the end of the unassigned pool.
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "curriculum.addItem",
        json!({ "courseId": course_id, "itemId": lesson_a }),
    );
    assert_eq!(list_ids(&board, "/unassigned"), vec![lesson_a.clone()]);
    assert_eq!(
        board.pointer("/unassigned/0/kind").and_then(|v| v.as_str()),
        Some("lesson")
    );
    assert_eq!(
        board
            .pointer("/unassigned/0/freePreview")
            .and_then(|v| v.as_bool()),
        Some(false)
    );
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "curriculum.addItem",
        json!({ "courseId": course_id, "itemId": quiz_a }),
    );
    assert_eq!(
        list_ids(&board, "/unassigned"),
        vec![lesson_a.clone(), quiz_a.clone()]
    );
    assert_eq!(
        board
            .pointer("/unassigned/1/questionCount")
            .and_then(|v| v.as_i64()),
        Some(2)
    );

    // The add dialog hides what the course already holds.
    let narrowed = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "curriculum.available",
        json!({ "courseId": course_id }),
    );
    assert_eq!(
        narrowed
            .get("lessons")
            .and_then(|v| v.as_array())
            .map(|arr| arr.len()),
        Some(1)
    );
    assert_eq!(
        narrowed
            .get("quizzes")
            .and_then(|v| v.as_array())
            .map(|arr| arr.len()),
        Some(0)
    );

    let board = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "curriculum.modules.create",
        json!({ "courseId": course_id }),
    );
    assert_eq!(
        board.pointer("/modules/0/name").and_then(|v| v.as_str()),
        Some("Module 1")
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "curriculum.modules.create",
        json!({ "courseId": course_id, "name": "Week 1" }),
    );

    // Drag the lesson from the pool into Week 1, then the quiz after it.
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "curriculum.move",
        json!({
            "courseId": course_id,
            "sourceIndex": 0,
            "destModule": "Week 1",
            "destIndex": 0
        }),
    );
    assert_eq!(list_ids(&board, "/modules/1/items"), vec![lesson_a.clone()]);
    assert_eq!(list_ids(&board, "/unassigned"), vec![quiz_a.clone()]);
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "curriculum.move",
        json!({
            "courseId": course_id,
            "sourceIndex": 0,
            "destModule": "Week 1",
            "destIndex": 1
        }),
    );
    assert_eq!(
        list_ids(&board, "/modules/1/items"),
        vec![lesson_a.clone(), quiz_a.clone()]
    );
    assert_eq!(board_item_count(&board), 2);

    // A fresh open sees exactly what the last mutation returned.
    let reopened = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "curriculum.open",
        json!({ "courseId": course_id }),
    );
    assert_eq!(
        reopened.pointer("/modules/0/name").and_then(|v| v.as_str()),
        Some("Module 1")
    );
    assert_eq!(
        list_ids(&reopened, "/modules/0/items"),
        Vec::<String>::new()
    );
    assert_eq!(
        list_ids(&reopened, "/modules/1/items"),
        vec![lesson_a.clone(), quiz_a.clone()]
    );
    assert_eq!(list_ids(&reopened, "/unassigned"), Vec::<String>::new());

    // Reorder within Week 1: the destination index addresses the list
    // after the dragged item came out.
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "curriculum.move",
        json!({
            "courseId": course_id,
            "sourceModule": "Week 1",
            "sourceIndex": 0,
            "destModule": "Week 1",
            "destIndex": 1
        }),
    );
    assert_eq!(
        list_ids(&board, "/modules/1/items"),
        vec![quiz_a.clone(), lesson_a.clone()]
    );

    // Dropping an item back onto its own slot changes nothing.
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "curriculum.move",
        json!({
            "courseId": course_id,
            "sourceModule": "Week 1",
            "sourceIndex": 0,
            "destModule": "Week 1",
            "destIndex": 0
        }),
    );
    assert_eq!(
        list_ids(&board, "/modules/1/items"),
        vec![quiz_a.clone(), lesson_a.clone()]
    );
    assert_eq!(board_item_count(&board), 2);

    // Removing frees the reference for the add dialog again.
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "curriculum.removeItem",
        json!({ "courseId": course_id, "itemId": lesson_a }),
    );
    assert_eq!(list_ids(&board, "/modules/1/items"), vec![quiz_a.clone()]);
    let freed = request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "curriculum.available",
        json!({ "courseId": course_id }),
    );
    assert_eq!(
        freed
            .get("lessons")
            .and_then(|v| v.as_array())
            .map(|arr| arr.len()),
        Some(2)
    );

    // Adding it back starts over in the pool, not in its old module.
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "21",
        "curriculum.addItem",
        json!({ "courseId": course_id, "itemId": lesson_a }),
    );
    assert_eq!(list_ids(&board, "/unassigned"), vec![lesson_a.clone()]);
    assert_eq!(list_ids(&board, "/modules/1/items"), vec![quiz_a.clone()]);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "22",
        "courses.list",
        json!({}),
    );
    assert_eq!(
        listed.pointer("/courses/0/itemCount").and_then(|v| v.as_i64()),
        Some(2)
    );
    assert_eq!(
        listed
            .pointer("/courses/0/moduleCount")
            .and_then(|v| v.as_i64()),
        Some(2)
    );
}

#[test]
fn board_mutations_report_typed_errors() {
    let workspace = temp_dir("courseloft-board-errors");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "onboarding.registerCompany",
        json!({
            "brandName": "Acme Learning",
            "ownerEmail": "dana@acmelearning.test",
            "ownerName": "Dana Reyes"
        }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "session.open",
        json!({ "email": "dana@acmelearning.test" }),
    );
    let l1 = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "lessons.create",
        json!({ "title": "Intro to Safety" }),
    );
    let lesson_a = format!(
        "lesson-{}",
        l1.get("lessonId").and_then(|v| v.as_str()).expect("lessonId")
    );
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "courses.create",
        json!({ "title": "Site Induction" }),
    );
    let course_id = course
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "curriculum.addItem",
        json!({ "courseId": course_id, "itemId": lesson_a }),
    );

    let dup = request(
        &mut stdin,
        &mut reader,
        "7",
        "curriculum.addItem",
        json!({ "courseId": course_id, "itemId": lesson_a }),
    );
    assert_eq!(
        dup.pointer("/error/code").and_then(|v| v.as_str()),
        Some("duplicate_item")
    );

    let bad_prefix = request(
        &mut stdin,
        &mut reader,
        "8",
        "curriculum.addItem",
        json!({ "courseId": course_id, "itemId": "video-abc" }),
    );
    assert_eq!(
        bad_prefix.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let dead_ref = request(
        &mut stdin,
        &mut reader,
        "9",
        "curriculum.addItem",
        json!({ "courseId": course_id, "itemId": "lesson-no-such-record" }),
    );
    assert_eq!(
        dead_ref.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_found")
    );

    let unknown_module = request(
        &mut stdin,
        &mut reader,
        "10",
        "curriculum.move",
        json!({
            "courseId": course_id,
            "sourceModule": "Nowhere",
            "sourceIndex": 0,
            "destIndex": 0
        }),
    );
    assert_eq!(
        unknown_module
            .pointer("/error/code")
            .and_then(|v| v.as_str()),
        Some("unknown_module")
    );

    let out_of_range = request(
        &mut stdin,
        &mut reader,
        "11",
        "curriculum.move",
        json!({
            "courseId": course_id,
            "sourceIndex": 5,
            "destIndex": 0
        }),
    );
    assert_eq!(
        out_of_range.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_index")
    );
    assert_eq!(
        out_of_range
            .pointer("/error/details/list")
            .and_then(|v| v.as_str()),
        Some("unassigned")
    );
    assert_eq!(
        out_of_range
            .pointer("/error/details/len")
            .and_then(|v| v.as_i64()),
        Some(1)
    );

    let missing_index = request(
        &mut stdin,
        &mut reader,
        "12",
        "curriculum.move",
        json!({ "courseId": course_id, "sourceIndex": 0 }),
    );
    assert_eq!(
        missing_index.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let gone = request(
        &mut stdin,
        &mut reader,
        "13",
        "curriculum.removeItem",
        json!({ "courseId": course_id, "itemId": "lesson-no-such-record" }),
    );
    assert_eq!(
        gone.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_found")
    );

    let no_course = request(
        &mut stdin,
        &mut reader,
        "14",
        "curriculum.open",
        json!({ "courseId": "not-a-course" }),
    );
    assert_eq!(
        no_course.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_found")
    );
}
