//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and provides methods for all bookmark-server endpoints.
//!
//! When API routes or request formats change, update only this file.
#![allow(dead_code)] // Not every test target uses every helper

use super::constants::*;
use reqwest::Response;
use serde_json::json;
use std::time::Duration;

/// HTTP test client with cookie-based session management
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    /// Creates a new unauthenticated client
    ///
    /// Use this for testing authentication flows.
    /// For most tests, use `authenticated()` instead.
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .cookie_store(true) // Automatically handle session cookies
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    /// Creates a client pre-authenticated as the regular test user
    ///
    /// # Panics
    ///
    /// Panics if session minting fails (indicates test infrastructure problem).
    pub async fn authenticated(base_url: String) -> Self {
        Self::authenticated_as(base_url, TEST_SUBJECT, TEST_EMAIL).await
    }

    /// Creates a client pre-authenticated as a specific identity
    pub async fn authenticated_as(base_url: String, subject: &str, email: &str) -> Self {
        let client = Self::new(base_url);

        let response = client.test_login(subject, email).await;
        assert_eq!(
            response.status(),
            reqwest::StatusCode::CREATED,
            "Test session minting failed: {:?}",
            response.text().await
        );

        client
    }

    // ========================================================================
    // Authentication Endpoints
    // ========================================================================

    /// Mint a session directly (dev-only route behind the test-login feature)
    pub async fn test_login(&self, subject: &str, email: &str) -> Response {
        self.client
            .post(format!("{}/v1/auth/test-login", self.base_url))
            .json(&json!({ "subject": subject, "email": email }))
            .send()
            .await
            .expect("test-login request failed")
    }

    /// Terminate the session via the form-POST signout route
    pub async fn signout(&self) -> Response {
        self.client
            .post(format!("{}/v1/auth/signout", self.base_url))
            .send()
            .await
            .expect("signout request failed")
    }

    /// Fetch the signed-in identity's display attributes
    pub async fn me(&self) -> Response {
        self.client
            .get(format!("{}/v1/me", self.base_url))
            .send()
            .await
            .expect("me request failed")
    }

    // ========================================================================
    // Page Routes
    // ========================================================================

    /// Fetch the main page (follows redirects)
    pub async fn home(&self) -> Response {
        self.client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .expect("home request failed")
    }

    // ========================================================================
    // Bookmark Endpoints
    // ========================================================================

    pub async fn get_bookmarks(&self) -> Response {
        self.client
            .get(format!("{}/v1/bookmarks", self.base_url))
            .send()
            .await
            .expect("get bookmarks request failed")
    }

    pub async fn add_bookmark(&self, title: &str, url: &str) -> Response {
        self.client
            .post(format!("{}/v1/bookmarks", self.base_url))
            .json(&json!({ "title": title, "url": url }))
            .send()
            .await
            .expect("add bookmark request failed")
    }

    pub async fn delete_bookmark(&self, id: &str) -> Response {
        self.client
            .delete(format!("{}/v1/bookmarks/{}", self.base_url, id))
            .send()
            .await
            .expect("delete bookmark request failed")
    }

    /// Parse the bookmark list response body
    pub async fn get_bookmarks_parsed(&self) -> Vec<serde_json::Value> {
        let response = self.get_bookmarks().await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        response.json().await.expect("bookmark list was not JSON")
    }
}
