mod test_support;

use serde_json::{json, Value};
use test_support::{request_ok, spawn_sidecar, temp_dir};

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

#[test]
fn deleted_library_records_vanish_from_the_board_without_errors() {
    let workspace = temp_dir("courseloft-stale-refs");
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
        json!({ "title": "Orientation" }),
    );
    let lesson_a_lib = l1
        .get("lessonId")
        .and_then(|v| v.as_str())
        .expect("lessonId")
        .to_string();
    let lesson_a = format!("lesson-{}", lesson_a_lib);
    let l2 = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "lessons.create",
        json!({ "title": "Deep Dive" }),
    );
    let lesson_b = format!(
        "lesson-{}",
        l2.get("lessonId").and_then(|v| v.as_str()).expect("lessonId")
    );
    let q1 = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "quizzes.create",
        json!({
            "title": "Checkpoint",
            "questions": [
                { "prompt": "Ready?", "choices": ["Yes", "No"], "answerIndex": 0 }
            ]
        }),
    );
    let quiz_a_lib = q1
        .get("quizId")
        .and_then(|v| v.as_str())
        .expect("quizId")
        .to_string();
    let quiz_a = format!("quiz-{}", quiz_a_lib);
    let course = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "courses.create",
        json!({ "title": "Field Guide" }),
    );
    let course_id = course
        .get("courseId")
        .and_then(|v| v.as_str())
        .expect("courseId")
        .to_string();

    for (id, item) in [("8", &lesson_a), ("9", &lesson_b), ("10", &quiz_a)] {
        request_ok(
            &mut stdin,
            &mut reader,
            id,
            "curriculum.addItem",
            json!({ "courseId": course_id, "itemId": item }),
        );
    }
    request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "curriculum.modules.create",
        json!({ "courseId": course_id, "name": "Week 1" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "curriculum.move",
        json!({
            "courseId": course_id,
            "sourceIndex": 1,
            "destModule": "Week 1",
            "destIndex": 0
        }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "13", "courses.list", json!({}));
    assert_eq!(
        listed.pointer("/courses/0/itemCount").and_then(|v| v.as_i64()),
        Some(3)
    );

    // The quiz disappears from its library while the course still points
    // at it. Opening the board neither errors nor shows the ghost.
    request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "quizzes.delete",
        json!({ "quizId": quiz_a_lib }),
    );
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "curriculum.open",
        json!({ "courseId": course_id }),
    );
    assert_eq!(list_ids(&board, "/modules/0/items"), vec![lesson_b.clone()]);
    assert_eq!(list_ids(&board, "/unassigned"), vec![lesson_a.clone()]);

    // The stored order still carries the stale reference until the next
    // reorder rewrites the document.
    let rawcount = request_ok(&mut stdin, &mut reader, "16", "courses.list", json!({}));
    assert_eq!(
        rawcount
            .pointer("/courses/0/itemCount")
            .and_then(|v| v.as_i64()),
        Some(3)
    );

    let available = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "curriculum.available",
        json!({ "courseId": course_id }),
    );
    assert_eq!(
        available
            .get("lessons")
            .and_then(|v| v.as_array())
            .map(|arr| arr.len()),
        Some(0)
    );
    assert_eq!(
        available
            .get("quizzes")
            .and_then(|v| v.as_array())
            .map(|arr| arr.len()),
        Some(0)
    );

    // Any move rebuilds the order from the resolved board, which garbage
    // collects the dangling id.
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "curriculum.move",
        json!({
            "courseId": course_id,
            "sourceIndex": 0,
            "destModule": "Week 1",
            "destIndex": 1
        }),
    );
    assert_eq!(
        list_ids(&board, "/modules/0/items"),
        vec![lesson_b.clone(), lesson_a.clone()]
    );
    assert_eq!(list_ids(&board, "/unassigned"), Vec::<String>::new());
    let compacted = request_ok(&mut stdin, &mut reader, "19", "courses.list", json!({}));
    assert_eq!(
        compacted
            .pointer("/courses/0/itemCount")
            .and_then(|v| v.as_i64()),
        Some(2)
    );

    // Learner surfaces resolve the same way.
    request_ok(
        &mut stdin,
        &mut reader,
        "20",
        "courses.update",
        json!({ "courseId": course_id, "patch": { "status": "published" } }),
    );
    let outline = request_ok(
        &mut stdin,
        &mut reader,
        "21",
        "learner.courseOutline",
        json!({ "courseId": course_id }),
    );
    assert_eq!(
        list_ids(&outline, "/modules/0/items"),
        vec![lesson_b.clone(), lesson_a.clone()]
    );
    let dashboard = request_ok(
        &mut stdin,
        &mut reader,
        "22",
        "learner.dashboard",
        json!({}),
    );
    assert_eq!(
        dashboard
            .pointer("/courses/0/itemCount")
            .and_then(|v| v.as_i64()),
        Some(2)
    );

    // A second deletion thins the board further, again without errors.
    request_ok(
        &mut stdin,
        &mut reader,
        "23",
        "lessons.delete",
        json!({ "lessonId": lesson_a_lib }),
    );
    let board = request_ok(
        &mut stdin,
        &mut reader,
        "24",
        "curriculum.open",
        json!({ "courseId": course_id }),
    );
    assert_eq!(list_ids(&board, "/modules/0/items"), vec![lesson_b.clone()]);
    assert_eq!(list_ids(&board, "/unassigned"), Vec::<String>::new());
}
