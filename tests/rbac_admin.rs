mod common;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::{json, Value};

use common::spawn_app;

#[tokio::test]
async fn admin_manages_roles_grants_and_assignments() -> Result<()> {
    let app = spawn_app().await?;
    let (admin, admin_id) = app.register("Admin", "admin@example.com").await?;
    app.ensure_role("Administrator", true).await?;
    app.assign(admin_id, "Administrator").await?;
    let (worker, worker_id) = app.register("Worker", "worker@example.com").await?;

    // Catalog
    let (status, catalog) = app.send("GET", "/rbac/catalog", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::OK);
    let projects = catalog
        .as_array()
        .and_then(|groups| groups.iter().find(|g| g["category"] == "Projects"))
        .context("missing Projects category")?;
    assert_eq!(projects["permissions"], json!(["Projects.View", "Projects.Edit", "Projects.Delete"]));

    // Create role
    let (status, role) = app
        .send(
            "POST",
            "/rbac/roles",
            Some(&admin),
            Some(json!({ "name": "Estimator", "description": "Prices jobs" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{role}");
    assert_eq!(role["display_name"], "Estimator");
    let role_id = role["id"].as_str().context("missing role id")?.to_string();

    let (status, _) = app
        .send("POST", "/rbac/roles", Some(&admin), Some(json!({ "name": "estimator" })))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // Unknown and malformed permissions are rejected
    for bad in ["Reports.Export", "Projects", ".View"] {
        let (status, _) = app
            .send(
                "PUT",
                &format!("/rbac/roles/{role_id}/permissions"),
                Some(&admin),
                Some(json!({ "permission": bad })),
            )
            .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{bad} should be rejected");
    }

    // Grant is stored canonically
    let (status, grant) = app
        .send(
            "PUT",
            &format!("/rbac/roles/{role_id}/permissions"),
            Some(&admin),
            Some(json!({ "permission": "projects.EDIT" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{grant}");
    assert_eq!(grant["permission"], "Projects.Edit");
    assert_eq!(grant["is_granted"], true);

    // Assign to worker, who can now work on projects
    let (status, _) = app
        .send(
            "POST",
            &format!("/rbac/users/{worker_id}/roles"),
            Some(&admin),
            Some(json!({ "role_id": role_id })),
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, roles) = app
        .send("GET", &format!("/rbac/users/{worker_id}/roles"), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(roles, json!(["Estimator"]));

    let (status, _) = app
        .send("POST", "/projects", Some(&worker), Some(json!({ "name": "Mill" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    // Effective permissions explain where each one came from
    let (status, effective) = app
        .send(
            "GET",
            &format!("/rbac/users/{worker_id}/effective-permissions"),
            Some(&admin),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = effective["permissions"]
        .as_array()
        .map(|items| items.iter().filter_map(|p| p["name"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec!["Projects.View", "Projects.Edit"]);

    // Worker cannot administer roles
    let (status, _) = app.send("GET", "/rbac/roles", Some(&worker), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Revoke the grant
    let (status, _) = app
        .send(
            "DELETE",
            &format!("/rbac/roles/{role_id}/permissions/Projects.Edit"),
            Some(&admin),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app.send("GET", "/projects", Some(&worker), None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Unassign, then delete the role
    let (status, _) = app
        .send(
            "DELETE",
            &format!("/rbac/users/{worker_id}/roles/{role_id}"),
            Some(&admin),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send("DELETE", &format!("/rbac/roles/{role_id}"), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, roles) = app.send("GET", "/rbac/roles", Some(&admin), None).await?;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<Value> = roles
        .as_array()
        .map(|items| items.iter().map(|r| r["name"].clone()).collect())
        .unwrap_or_default();
    assert_eq!(names, vec![json!("Administrator")]);

    Ok(())
}

#[tokio::test]
async fn direct_grants_are_managed_per_user() -> Result<()> {
    let app = spawn_app().await?;
    let (admin, admin_id) = app.register("Admin", "admin@example.com").await?;
    app.ensure_role("Administrator", true).await?;
    app.assign(admin_id, "Administrator").await?;
    let (worker, worker_id) = app.register("Worker", "worker@example.com").await?;

    let (status, grant) = app
        .send(
            "PUT",
            &format!("/rbac/users/{worker_id}/permissions"),
            Some(&admin),
            Some(json!({ "permission": "reports.view", "access_level": "read_only" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "{grant}");
    assert_eq!(grant, json!({ "permission": "Reports.View", "access_level": "read_only" }));

    let (status, rejection) = app
        .send(
            "PUT",
            &format!("/rbac/users/{worker_id}/permissions"),
            Some(&admin),
            Some(json!({ "permission": "Reports.View", "access_level": "everything" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(rejection.as_str().is_some_and(|text| text.contains("everything")), "{rejection}");

    let (status, grants) = app
        .send("GET", &format!("/rbac/users/{worker_id}/permissions"), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grants, json!([{ "permission": "Reports.View", "access_level": "read_only" }]));

    let (status, me) = app.send("GET", "/auth/me", Some(&worker), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["permissions"], json!([{ "name": "Reports.View", "rule": "direct_grant" }]));

    Ok(())
}

#[tokio::test]
async fn only_system_role_holders_hand_out_system_roles() -> Result<()> {
    let app = spawn_app().await?;
    let (manager, manager_id) = app.register("Manager", "manager@example.com").await?;
    app.grant("RoleManager", "Roles.Edit").await?;
    app.grant("RoleManager", "Users.Edit").await?;
    app.assign(manager_id, "RoleManager").await?;

    let (status, _) = app
        .send(
            "POST",
            "/rbac/roles",
            Some(&manager),
            Some(json!({ "name": "Root", "is_system_role": true })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin_role = app.ensure_role("Administrator", true).await?;
    let (status, _) = app
        .send(
            "POST",
            &format!("/rbac/users/{manager_id}/roles"),
            Some(&manager),
            Some(json!({ "role_id": admin_role })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Ordinary roles are fine
    let (status, _) = app
        .send("POST", "/rbac/roles", Some(&manager), Some(json!({ "name": "Clerk" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    Ok(())
}

#[tokio::test]
async fn system_roles_cannot_be_taken_away_without_one() -> Result<()> {
    let app = spawn_app().await?;
    let (admin, admin_id) = app.register("Admin", "admin@example.com").await?;
    let admin_role = app.ensure_role("Administrator", true).await?;
    app.assign(admin_id, "Administrator").await?;

    let (manager, manager_id) = app.register("Manager", "manager@example.com").await?;
    app.grant("RoleManager", "Roles.Delete").await?;
    app.grant("RoleManager", "Users.Edit").await?;
    app.assign(manager_id, "RoleManager").await?;

    let (status, _) = app
        .send(
            "DELETE",
            &format!("/rbac/users/{admin_id}/roles/{admin_role}"),
            Some(&manager),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send("DELETE", &format!("/rbac/roles/{admin_role}"), Some(&manager), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The administrator still holds the role and its bypass
    let (status, _) = app
        .send("POST", "/projects", Some(&admin), Some(json!({ "name": "Yard" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED);

    // Ordinary roles can still be removed by the manager
    let clerk = app.ensure_role("Clerk", false).await?;
    app.assign(admin_id, "Clerk").await?;
    let (status, _) = app
        .send(
            "DELETE",
            &format!("/rbac/users/{admin_id}/roles/{clerk}"),
            Some(&manager),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send("DELETE", &format!("/rbac/roles/{clerk}"), Some(&manager), None)
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // A system role holder may remove it
    let (status, _) = app
        .send(
            "DELETE",
            &format!("/rbac/users/{admin_id}/roles/{admin_role}"),
            Some(&admin),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NO_CONTENT);

    Ok(())
}

#[tokio::test]
async fn missing_targets_are_not_found() -> Result<()> {
    let app = spawn_app().await?;
    let (admin, admin_id) = app.register("Admin", "admin@example.com").await?;
    app.ensure_role("Administrator", true).await?;
    app.assign(admin_id, "Administrator").await?;
    let missing = uuid::Uuid::new_v4();

    let (status, _) = app
        .send("GET", &format!("/rbac/roles/{missing}/permissions"), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(
            "GET",
            &format!("/rbac/users/{missing}/effective-permissions"),
            Some(&admin),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send("DELETE", &format!("/rbac/roles/{missing}"), Some(&admin), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    Ok(())
}
