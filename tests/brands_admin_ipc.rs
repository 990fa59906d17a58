mod test_support;

use serde_json::json;
use test_support::{request, request_ok, spawn_sidecar, temp_dir};

#[test]
fn brands_crud_counts_and_cascade_delete() {
    let workspace = temp_dir("courseloft-brands-admin");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({
            "path": workspace.to_string_lossy(),
            "adminEmail": "root@courseloft.test",
            "adminName": "Platform Root"
        }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "session.open",
        json!({ "email": "root@courseloft.test" }),
    );

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "brands.create",
        json!({ "name": "North Star Training", "primaryColor": "#1d4ed8" }),
    );
    let north_star = created
        .get("brandId")
        .and_then(|v| v.as_str())
        .expect("brandId")
        .to_string();

    let dup = request(
        &mut stdin,
        &mut reader,
        "4",
        "brands.create",
        json!({ "name": "North Star Training" }),
    );
    assert_eq!(
        dup.pointer("/error/code").and_then(|v| v.as_str()),
        Some("name_in_use")
    );

    // A second tenant arriving through onboarding shows up alongside.
    let registered = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "onboarding.registerCompany",
        json!({
            "brandName": "Acme Learning",
            "ownerEmail": "dana@acmelearning.test",
            "ownerName": "Dana Reyes"
        }),
    );
    let acme = registered
        .get("brandId")
        .and_then(|v| v.as_str())
        .expect("brandId")
        .to_string();
    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "courses.create",
        json!({ "brandId": acme, "title": "Acme Onboarding" }),
    );

    let listed = request_ok(&mut stdin, &mut reader, "7", "brands.list", json!({}));
    let brands = listed.get("brands").and_then(|v| v.as_array()).expect("brands");
    assert_eq!(brands.len(), 2);
    // Sorted by name, so Acme comes first.
    assert_eq!(brands[0].get("name").and_then(|v| v.as_str()), Some("Acme Learning"));
    assert_eq!(brands[0].get("userCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(brands[0].get("courseCount").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(brands[1].get("name").and_then(|v| v.as_str()), Some("North Star Training"));
    assert_eq!(brands[1].get("userCount").and_then(|v| v.as_i64()), Some(0));

    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "brands.update",
        json!({ "brandId": north_star, "patch": { "accentColor": "#f59e0b" } }),
    );
    assert_eq!(
        updated.pointer("/theme/accent").and_then(|v| v.as_str()),
        Some("hsl(38, 92%, 50%)")
    );

    let bad_patch = request(
        &mut stdin,
        &mut reader,
        "9",
        "brands.update",
        json!({ "brandId": north_star, "patch": { "slogan": "Onward" } }),
    );
    assert_eq!(
        bad_patch.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );
    let name_clash = request(
        &mut stdin,
        &mut reader,
        "10",
        "brands.update",
        json!({ "brandId": north_star, "patch": { "name": "Acme Learning" } }),
    );
    assert_eq!(
        name_clash.pointer("/error/code").and_then(|v| v.as_str()),
        Some("name_in_use")
    );

    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "brands.open",
        json!({ "brandId": north_star }),
    );
    assert_eq!(
        opened.pointer("/brand/accentColor").and_then(|v| v.as_str()),
        Some("#f59e0b")
    );

    // Deleting a brand takes its users and content with it.
    request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "brands.delete",
        json!({ "brandId": acme }),
    );
    let after = request_ok(&mut stdin, &mut reader, "13", "brands.list", json!({}));
    assert_eq!(
        after
            .get("brands")
            .and_then(|v| v.as_array())
            .map(|arr| arr.len()),
        Some(1)
    );
    let users = request_ok(&mut stdin, &mut reader, "14", "users.list", json!({}));
    let emails: Vec<&str> = users
        .get("users")
        .and_then(|v| v.as_array())
        .expect("users")
        .iter()
        .filter_map(|u| u.get("email").and_then(|v| v.as_str()))
        .collect();
    assert!(!emails.contains(&"dana@acmelearning.test"));
    let owner_gone = request(
        &mut stdin,
        &mut reader,
        "15",
        "session.open",
        json!({ "email": "dana@acmelearning.test" }),
    );
    assert_eq!(
        owner_gone.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_found")
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "16",
        "brands.delete",
        json!({ "brandId": acme }),
    );
    assert_eq!(
        missing.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_found")
    );
}

#[test]
fn owner_may_restyle_only_their_own_brand() {
    let workspace = temp_dir("courseloft-brands-owner");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let first = request_ok(
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
    let acme = first
        .get("brandId")
        .and_then(|v| v.as_str())
        .expect("brandId")
        .to_string();
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "onboarding.registerCompany",
        json!({
            "brandName": "Borealis Studio",
            "ownerEmail": "lee@borealis.test",
            "ownerName": "Lee Park"
        }),
    );
    let borealis = second
        .get("brandId")
        .and_then(|v| v.as_str())
        .expect("brandId")
        .to_string();

    request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "session.open",
        json!({ "email": "dana@acmelearning.test" }),
    );
    let own = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "brands.update",
        json!({ "brandId": acme, "patch": { "primaryColor": "#2563eb" } }),
    );
    assert_eq!(
        own.pointer("/theme/primary").and_then(|v| v.as_str()),
        Some("hsl(221, 83%, 53%)")
    );

    let foreign = request(
        &mut stdin,
        &mut reader,
        "6",
        "brands.update",
        json!({ "brandId": borealis, "patch": { "primaryColor": "#2563eb" } }),
    );
    assert_eq!(
        foreign.pointer("/error/code").and_then(|v| v.as_str()),
        Some("forbidden")
    );
}
