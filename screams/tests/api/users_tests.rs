use std::time::Duration;

use super::support::*;

#[tokio::test]
async fn signup_reports_every_invalid_field() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/signup",
            None,
            json!({ "email": "nope", "password": "secret1", "confirmPassword": "secret2", "handle": " " }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "email": "Must be a valid email address",
            "confirmPassword": "Passwords must match",
            "handle": "Must not be empty",
        })
    );
}

#[tokio::test]
async fn signup_rejects_taken_handle_and_email() {
    let app = TestApp::new();
    app.signup("alice").await;

    let (status, body) = app
        .post(
            "/signup",
            None,
            json!({ "email": "other@example.com", "password": PASSWORD, "confirmPassword": PASSWORD, "handle": "alice" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "handle": "this handle is already taken" }));

    let (status, body) = app
        .post(
            "/signup",
            None,
            json!({ "email": "alice@example.com", "password": PASSWORD, "confirmPassword": PASSWORD, "handle": "alice2" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "email": "Email is already in use" }));
    assert!(app.store.get(Collection::Users, "alice2").await.unwrap().is_none());
}

#[tokio::test]
async fn signup_with_weak_password_is_a_server_error() {
    let app = TestApp::new();
    let (status, body) = app
        .post(
            "/signup",
            None,
            json!({ "email": "a@example.com", "password": "123", "confirmPassword": "123", "handle": "a" }),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({ "general": "Something went wrong, please try again" }));
}

#[tokio::test]
async fn login_round_trip() {
    let app = TestApp::new();
    app.signup("alice").await;

    let (status, body) = app
        .post("/login", None, json!({ "email": "alice@example.com", "password": PASSWORD }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().expect("token").to_string();

    let (status, me) = app.get("/user", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["credentials"]["handle"], json!("alice"));
}

#[tokio::test]
async fn login_failures() {
    let app = TestApp::new();
    app.signup("alice").await;

    let (status, body) = app.post("/login", None, json!({ "email": "", "password": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "email": "Must not be empty", "password": "Must not be empty" }));

    let (status, body) = app
        .post("/login", None, json!({ "email": "alice@example.com", "password": "wrong-pw" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "general": "Wrong credentials, please try again" }));

    let (status, _) = app
        .post("/login", None, json!({ "email": "ghost@example.com", "password": PASSWORD }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;

    let (status, body) = app
        .post_raw("/login", None, Some("application/json"), "{\"email\": ")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let (status, body) = app
        .post_raw("/login", None, None, r#"{"email":"alice@example.com","password":"secret1"}"#)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");

    let (status, body) = app
        .post("/notifications", Some(&alice), json!({ "ids": ["n1"] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string(), "{body}");
}

#[tokio::test]
async fn own_details_include_likes() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let scream_id = app.scream(&alice, "self").await;
    app.get(&format!("/scream/{scream_id}/like"), Some(&alice)).await;

    let (status, me) = app.get("/user", Some(&alice)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["credentials"]["email"], json!("alice@example.com"));
    assert!(me["credentials"]["userId"].is_string());
    assert_eq!(me["likes"], json!([{
        "userHandle": "alice",
        "screamId": scream_id,
        "createdAt": me["likes"][0]["createdAt"].clone(),
    }]));
    assert_eq!(me["notifications"], json!([]));
}

#[tokio::test]
async fn own_details_require_auth() {
    let app = TestApp::new();
    let (status, body) = app.get("/user", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "Unauthorized" }));
}

#[tokio::test]
async fn public_profile_lists_screams_newest_first() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;
    let bob = app.signup("bob").await;
    let older = app.scream(&alice, "older").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let newer = app.scream(&alice, "newer").await;
    app.scream(&bob, "not alice").await;

    let (status, body) = app.get("/user/alice", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["handle"], json!("alice"));
    let ids: Vec<&str> = body["screams"]
        .as_array()
        .expect("screams")
        .iter()
        .filter_map(|scream| scream["screamId"].as_str())
        .collect();
    assert_eq!(ids, vec![newer.as_str(), older.as_str()]);

    let (status, body) = app.get("/user/nobody", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "User not found" }));
}

#[tokio::test]
async fn details_are_reduced_before_storing() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;

    let (status, body) = app
        .post("/user", Some(&alice), json!({ "bio": "", "website": "foo.com", "location": "x" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "Details added successfully" }));

    let (_, profile) = app.get("/user/alice", None).await;
    assert_eq!(profile["user"]["website"], json!("http://foo.com"));
    assert_eq!(profile["user"]["location"], json!("x"));
    assert!(profile["user"].get("bio").is_none());
}

#[tokio::test]
async fn image_upload_rejects_bad_input() {
    let app = TestApp::new();
    let alice = app.signup("alice").await;

    let (status, body) = app
        .upload(&alice, &[("image", Some("notes.txt"), "text/plain", b"hello")])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Wrong file type submitted" }));

    let (status, body) = app.upload(&alice, &[("caption", None, "text/plain", b"hi")]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No image submitted" }));
}

#[tokio::test]
async fn image_upload_updates_profile_and_screams() {
    let mut app = TestApp::new();
    let alice = app.signup("alice").await;
    let scream_id = app.scream(&alice, "before the selfie").await;

    let (status, body) = app
        .upload(&alice, &[("image", Some("me.PNG"), "image/png", b"\x89PNG fake")])
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, json!({ "message": "Image uploaded successfully" }));

    let (_, profile) = app.get("/user/alice", None).await;
    let image_url = profile["user"]["imageUrl"].as_str().expect("imageUrl").to_string();
    let name = image_url
        .strip_prefix("http://screams.test/media/")
        .expect("served from media");
    assert!(name.ends_with(".png"));
    assert_eq!(std::fs::read(app.media_dir().join(name)).unwrap(), b"\x89PNG fake");

    app.settle().await;
    let scream = app.scream_doc(&scream_id).await.expect("scream");
    assert_eq!(scream["userImage"], json!(image_url));
}
