//! HTTP integration tests.
//!
//! Static file serving through the producer chain, redirects, identity
//! cookies, and the REST introspection endpoints.

mod fixtures;

use fixtures::{ICON_BYTES, MAIN_HTML, TestServer};

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_root_serves_main_page() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/")
        .send()
        .await
        .expect("request failed");

    // then: body and content type come from pages/main.html
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "text/html; charset=utf-8"
    );
    assert_eq!(response.text().await.unwrap(), MAIN_HTML);
}

#[tokio::test]
async fn test_html_alias_maps_into_pages() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/about.html")
        .send()
        .await
        .unwrap();

    // then:
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), fixtures::ABOUT_HTML);
}

#[tokio::test]
async fn test_room_path_redirects_to_trailing_slash() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/room/welcome")
        .send()
        .await
        .unwrap();

    // then:
    assert_eq!(response.status(), 301);
    assert_eq!(response.headers()["location"], "/room/welcome/");
}

#[tokio::test]
async fn test_room_page_serves_the_room_shell() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/room/welcome/")
        .send()
        .await
        .unwrap();

    // then:
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), fixtures::ROOM_HTML);
}

#[tokio::test]
async fn test_favicon_alias_reaches_icon_bytes() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/favicon.ico")
        .send()
        .await
        .unwrap();

    // then:
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "image/vnd.microsoft.icon"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), ICON_BYTES);
}

#[tokio::test]
async fn test_version_js_is_synthesized() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/static/version.js")
        .send()
        .await
        .unwrap();

    // then:
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "application/javascript; charset=utf-8"
    );
    let body = response.text().await.unwrap();
    assert!(body.starts_with("this._instantVersion_ = {version: \""));
}

#[tokio::test]
async fn test_css_content_type() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/static/app.css")
        .send()
        .await
        .unwrap();

    // then:
    assert_eq!(response.headers()["content-type"], "text/css; charset=utf-8");
}

#[tokio::test]
async fn test_paths_outside_whitelist_are_not_served() {
    // given: secret.txt exists at the webroot, outside /pages and /static
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/secret.txt")
        .send()
        .await
        .unwrap();

    // then:
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/no/such/thing")
        .send()
        .await
        .unwrap();

    // then:
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_identity_cookie_is_minted_and_kept() {
    // given:
    let server = TestServer::start().await;

    // when: a first request arrives with no cookie
    let response = client().get(server.base_url() + "/").send().await.unwrap();
    let set_cookie = response
        .headers()
        .get("set-cookie")
        .expect("no identity cookie minted")
        .to_str()
        .unwrap()
        .to_string();

    // then: the sid cookie carries the configured attributes
    assert!(set_cookie.starts_with("sid="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Max-Age=31536000"));

    // and presenting it back does not re-issue
    let sid = set_cookie.split(';').next().unwrap().to_string();
    let again = client()
        .get(server.base_url() + "/")
        .header("cookie", sid)
        .send()
        .await
        .unwrap();
    assert!(again.headers().get("set-cookie").is_none());
}

#[tokio::test]
async fn test_health_endpoint() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/api/health")
        .send()
        .await
        .unwrap();

    // then:
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_rooms_list_is_empty_without_clients() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/api/rooms")
        .send()
        .await
        .unwrap();

    // then:
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!([]));
}

#[tokio::test]
async fn test_room_detail_unknown_room_is_404() {
    // given:
    let server = TestServer::start().await;

    // when:
    let response = client()
        .get(server.base_url() + "/api/rooms/nonexistent")
        .send()
        .await
        .unwrap();

    // then:
    assert_eq!(response.status(), 404);
}
