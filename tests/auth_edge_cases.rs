mod common;

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use common::spawn_app;

#[tokio::test]
async fn auth_edge_cases() -> Result<()> {
    let app = spawn_app().await?;

    // 1. Register with short password
    let (status, _) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "name": "Short Pass", "email": "short@example.com", "password": "short" })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "Should fail with bad request for short password");

    // 2. Register with malformed email
    let (status, _) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "name": "No Domain", "email": "nodomain", "password": "password123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // 3. Register with valid user
    let (token, _) = app.register("Valid User", "Valid@Example.com").await?;

    // 4. Same email with different case is taken
    let (status, _) = app
        .send(
            "POST",
            "/auth/register",
            None,
            Some(json!({ "name": "Again", "email": "valid@example.COM", "password": "password123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    // 5. Login with wrong password
    let (status, _) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "valid@example.com", "password": "wrongpassword" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "Should fail with unauthorized for wrong password");

    // 6. Login with non-existent email
    let (status, _) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "nobody@example.com", "password": "password123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 7. Login is case-insensitive on email
    let (status, body) = app
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "VALID@example.com", "password": "password123" })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    assert!(body["token"].is_string());

    // 8. /auth/me without a token
    let (status, _) = app.send("GET", "/auth/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 9. /auth/me with a garbage token is treated as anonymous
    let (status, _) = app.send("GET", "/auth/me", Some("not-a-jwt"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 10. /auth/me for a user with no roles: profile, nothing granted
    let (status, body) = app.send("GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "valid@example.com");
    assert_eq!(body["roles"], json!([]));
    assert_eq!(body["permissions"], json!([]));

    // 11. logout requires authentication
    let (status, _) = app.send("POST", "/auth/logout", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.send("POST", "/auth/logout", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn me_lists_effective_permissions_with_their_source() -> Result<()> {
    let app = spawn_app().await?;
    let (token, user_id) = app.register("Estimator", "est@example.com").await?;
    app.grant("Estimator", "Estimates.Edit").await?;
    app.assign(user_id, "estimator").await?;

    let (status, body) = app.send("GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["roles"], json!(["Estimator"]));

    let permissions = body["permissions"].as_array().cloned().unwrap_or_default();
    assert_eq!(permissions.len(), 2, "{body}");
    assert!(permissions.contains(&json!({
        "name": "Estimates.View",
        "rule": "implied_grant",
        "role": "Estimator",
        "via": "Estimates.Edit"
    })));
    assert!(permissions.contains(&json!({
        "name": "Estimates.Edit",
        "rule": "role_grant",
        "role": "Estimator"
    })));

    Ok(())
}
