//! Basic example demonstrating layered options.
//!
//! This example shows how to:
//! - Configure client-wide defaults (base URL, headers, params)
//! - Override and remove defaults per call
//! - Send JSON bodies and read typed replies
//! - Report download progress
//!
//! Run with: `cargo run --example basic_fetch`

use layerfetch::{Client, Error, FetchOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("layerfetch=debug,basic_fetch=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .default_header("x-client", "layerfetch-demo")?
        .param("_limit", 5)
        .build()?;

    println!("=== GET with default params ===");
    let posts = client.get::<Vec<Post>>("/posts").await?;
    println!("Fetched {} posts in {:?}", posts.len(), posts.latency);

    println!("=== Input query wins over defaults ===");
    let posts = client.get::<Vec<Post>>("/posts?_limit=2").await?;
    println!("Fetched {} posts", posts.len());

    println!("=== Call-level overrides ===");
    let options = FetchOptions::new()
        .remove_param("_limit")
        .param("userId", 1)
        .remove_header("x-client")?
        .on_download_progress(|p| {
            if let Some(ratio) = p.ratio {
                println!("  downloaded {:>3.0}%", ratio * 100.0);
            }
        });
    let posts = client.fetch::<Vec<Post>>("/posts", options).await?;
    println!("User 1 has {} posts", posts.len());

    println!("=== POST a JSON body ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };
    let created = client.post::<_, Post>("/posts", &new_post).await?;
    println!("Created post ID: {}", created.id);
    println!("Status code: {}", created.status);
    println!("Content-Type: {:?}", created.header("content-type"));
    println!("Was retried: {}", created.was_retried());

    Ok(())
}
