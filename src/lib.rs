//! A reading-progress sync server for document readers.
//!
//! Synchronizes reading position across devices and reconciles the fact
//! that the same logical document can appear under different
//! content-derived identifiers, by discovering and recording equivalence
//! between those identifiers.

#![deny(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod auth;
pub mod books;
pub mod canonical;
pub mod card;
pub mod config;
pub mod http;
pub mod server;
pub mod state;
mod store;

// Re-export to be able to embed the store in other servers
pub use store::{
    BookLabel, DocumentLink, EntityStore, ProgressRecord, RedbStore, SqliteStore, StoreError,
    StoreResult, User, open_store,
};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use reqwest::StatusCode;
    use serde_json::{Value, json};
    use tracing_test::traced_test;
    use url::Url;

    use crate::{
        http::{AUTH_KEY_HEADER, AUTH_USER_HEADER},
        server::Server,
        store::{EntityStore, RedbStore, SqliteStore},
    };

    fn stores() -> Vec<Arc<dyn EntityStore>> {
        vec![
            Arc::new(SqliteStore::in_memory().unwrap()),
            Arc::new(RedbStore::in_memory().unwrap()),
        ]
    }

    async fn register(client: &reqwest::Client, url: &Url, username: &str) -> Result<StatusCode> {
        let res = client
            .post(url.join("/users/create")?)
            .json(&json!({ "username": username, "password": "5f4dcc3b5aa765d61d8327deb882cf99" }))
            .send()
            .await?;
        Ok(res.status())
    }

    fn authed(req: reqwest::RequestBuilder, username: &str) -> reqwest::RequestBuilder {
        req.header(AUTH_USER_HEADER, username)
            .header(AUTH_KEY_HEADER, "5f4dcc3b5aa765d61d8327deb882cf99")
    }

    async fn put_progress(
        client: &reqwest::Client,
        url: &Url,
        username: &str,
        document: &str,
        percentage: f64,
        filename: Option<&str>,
    ) -> Result<StatusCode> {
        let mut body = json!({
            "document": document,
            "progress": "/body/DocFragment[2]",
            "percentage": percentage,
            "device": "boox",
            "device_id": "dev-1",
        });
        if let Some(filename) = filename {
            body["filename"] = json!(filename);
        }
        let res = authed(client.put(url.join("/syncs/progress")?), username)
            .json(&body)
            .send()
            .await?;
        Ok(res.status())
    }

    #[tokio::test]
    #[traced_test]
    async fn register_and_authenticate() -> Result<()> {
        for store in stores() {
            let (server, url) = Server::spawn_for_tests(store).await?;
            let client = reqwest::Client::new();

            assert_eq!(register(&client, &url, "alice").await?, StatusCode::CREATED);
            // duplicate registration: the KOReader protocol expects 402
            assert_eq!(
                register(&client, &url, "alice").await?,
                StatusCode::PAYMENT_REQUIRED
            );
            // empty fields are invalid
            let res = client
                .post(url.join("/users/create")?)
                .json(&json!({ "username": "", "password": "" }))
                .send()
                .await?;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);

            let res = authed(client.get(url.join("/users/auth")?), "alice")
                .send()
                .await?;
            assert_eq!(res.status(), StatusCode::OK);
            let body: Value = res.json().await?;
            assert_eq!(body["status"], "authenticated");

            // unknown user, wrong key and missing headers are indistinguishable
            let res = authed(client.get(url.join("/users/auth")?), "nobody")
                .send()
                .await?;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
            let res = client
                .get(url.join("/users/auth")?)
                .header(AUTH_USER_HEADER, "alice")
                .header(AUTH_KEY_HEADER, "wrong")
                .send()
                .await?;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
            let res = client.get(url.join("/users/auth")?).send().await?;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

            server.shutdown().await?;
        }
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn progress_sync_round_trip() -> Result<()> {
        for store in stores() {
            let (server, url) = Server::spawn_for_tests(store).await?;
            let client = reqwest::Client::new();
            register(&client, &url, "alice").await?;

            assert_eq!(
                put_progress(&client, &url, "alice", "doc1", 0.25, None).await?,
                StatusCode::OK
            );
            let res = authed(client.get(url.join("/syncs/progress/doc1")?), "alice")
                .send()
                .await?;
            assert_eq!(res.status(), StatusCode::OK);
            let body: Value = res.json().await?;
            assert_eq!(body["document"], "doc1");
            assert_eq!(body["percentage"], 0.25);
            assert_eq!(body["device"], "boox");

            // later write fully replaces the record
            assert_eq!(
                put_progress(&client, &url, "alice", "doc1", 0.75, None).await?,
                StatusCode::OK
            );
            let res = authed(client.get(url.join("/syncs/progress/doc1")?), "alice")
                .send()
                .await?;
            let body: Value = res.json().await?;
            assert_eq!(body["percentage"], 0.75);

            // out-of-range percentages are rejected
            assert_eq!(
                put_progress(&client, &url, "alice", "doc1", 1.5, None).await?,
                StatusCode::BAD_REQUEST
            );
            assert_eq!(
                put_progress(&client, &url, "alice", "doc1", -0.1, None).await?,
                StatusCode::BAD_REQUEST
            );
            // missing fields are rejected
            let res = authed(client.put(url.join("/syncs/progress")?), "alice")
                .json(&json!({ "document": "doc1" }))
                .send()
                .await?;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);

            // unknown document
            let res = authed(client.get(url.join("/syncs/progress/none")?), "alice")
                .send()
                .await?;
            assert_eq!(res.status(), StatusCode::NOT_FOUND);

            server.shutdown().await?;
        }
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn same_filename_resolves_to_earliest_document() -> Result<()> {
        for store in stores() {
            let (server, url) = Server::spawn_for_tests(store).await?;
            let client = reqwest::Client::new();
            register(&client, &url, "alice").await?;

            // the same book, re-exported under a second content hash
            put_progress(&client, &url, "alice", "doc1", 0.25, Some("book.epub")).await?;
            put_progress(&client, &url, "alice", "doc2", 0.5, Some("book.epub")).await?;

            // reading doc2 lands on the record keyed under doc1
            let res = authed(client.get(url.join("/syncs/progress/doc2")?), "alice")
                .send()
                .await?;
            assert_eq!(res.status(), StatusCode::OK);
            let body: Value = res.json().await?;
            assert_eq!(body["document"], "doc1");
            assert_eq!(body["percentage"], 0.5);

            let res = authed(client.get(url.join("/documents/links")?), "alice")
                .send()
                .await?;
            let links: Value = res.json().await?;
            assert_eq!(
                links,
                json!([{ "document_hash": "doc2", "canonical_hash": "doc1" }])
            );

            server.shutdown().await?;
        }
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn explicit_link_and_unlink() -> Result<()> {
        let (server, url) = Server::spawn_for_tests(stores().remove(1)).await?;
        let client = reqwest::Client::new();
        register(&client, &url, "alice").await?;

        // no progress on either hash: the first given hash wins
        let res = authed(client.post(url.join("/documents/link")?), "alice")
            .json(&json!({ "hashes": ["x", "y"] }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body: Value = res.json().await?;
        assert_eq!(body["canonical"], "x");
        assert_eq!(body["linked"], json!(["y"]));

        // fewer than two hashes is invalid
        let res = authed(client.post(url.join("/documents/link")?), "alice")
            .json(&json!({ "hashes": ["x"] }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);

        let res = authed(client.delete(url.join("/documents/link/y")?), "alice")
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        let res = authed(client.delete(url.join("/documents/link/y")?), "alice")
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        server.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn book_listing_labels_and_pagination() -> Result<()> {
        let (server, url) = Server::spawn_for_tests(stores().remove(0)).await?;
        let client = reqwest::Client::new();
        register(&client, &url, "alice").await?;

        put_progress(&client, &url, "alice", "a", 0.5, Some("novel.epub")).await?;
        // "a" has progress, so it wins the merge and "b" links to it
        let res = authed(client.post(url.join("/documents/link")?), "alice")
            .json(&json!({ "hashes": ["b", "a"] }))
            .send()
            .await?;
        let body: Value = res.json().await?;
        assert_eq!(body["canonical"], "a");

        let res = authed(client.get(url.join("/books")?), "alice")
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await?;
        let books = body["books"].as_array().unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0]["canonical_hash"], "a");
        assert_eq!(books[0]["linked_hashes"], json!(["b"]));
        assert_eq!(books[0]["filename"], "novel.epub");

        // offset beyond the list is an empty result, not an error
        let res = authed(client.get(url.join("/books?offset=10&limit=5")?), "alice")
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await?;
        assert_eq!(body["books"], json!([]));

        // labels attach to known books only
        let res = authed(client.put(url.join("/books/label")?), "alice")
            .json(&json!({ "canonical_hash": "a", "label": "My Novel" }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        let res = authed(client.put(url.join("/books/label")?), "alice")
            .json(&json!({ "canonical_hash": "unknown", "label": "Nope" }))
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let res = authed(client.get(url.join("/books")?), "alice")
            .send()
            .await?;
        let body: Value = res.json().await?;
        assert_eq!(body["books"][0]["label"], "My Novel");

        let res = authed(client.delete(url.join("/books/label/a")?), "alice")
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::OK);
        let res = authed(client.delete(url.join("/books/label/a")?), "alice")
            .send()
            .await?;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        server.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn progress_card_is_public() -> Result<()> {
        let (server, url) = Server::spawn_for_tests(stores().remove(0)).await?;
        let client = reqwest::Client::new();
        register(&client, &url, "alice").await?;
        put_progress(&client, &url, "alice", "doc1", 0.5, Some("novel.epub")).await?;

        // no auth headers
        let res = client.get(url.join("/card/alice?limit=3")?).send().await?;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(
            res.headers()["content-type"]
                .to_str()?
                .starts_with("image/svg+xml")
        );
        assert!(res.headers().contains_key("cache-control"));
        let body = res.text().await?;
        assert!(body.contains("Currently Reading"));
        assert!(body.contains("novel.epub"));

        let res = client.get(url.join("/card/nobody")?).send().await?;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        server.shutdown().await?;
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn health_endpoints() -> Result<()> {
        let (server, url) = Server::spawn_for_tests(stores().remove(1)).await?;
        let client = reqwest::Client::new();
        let res = client.get(url.join("/health")?).send().await?;
        assert_eq!(res.status(), StatusCode::OK);
        let res = client.get(url.join("/healthcheck")?).send().await?;
        assert_eq!(res.status(), StatusCode::OK);
        server.shutdown().await?;
        Ok(())
    }
}
