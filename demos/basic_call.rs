//! Basic example demonstrating simple GET and POST requests.
//!
//! This example shows how to:
//! - Create a client with basic configuration
//! - Make GET and POST requests
//! - Decode responses and wrap them in an API envelope
//!
//! Run with: `cargo run --example basic_call`

use serde::{Deserialize, Serialize};
use svckit::{json, Client, Envelope, Error, RequestConfig};

#[derive(Debug, Serialize, Deserialize)]
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
        .with_env_filter("svckit=debug,basic_call=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .build()?;

    println!("=== GET Request Example ===");
    let response = client.get("/posts/1").await?;
    let post: Post = response.json()?;

    println!("Post ID: {}", post.id);
    println!("Title: {}", post.title);
    println!("Request latency: {:?}", response.latency);
    println!("Status code: {}", response.status);
    println!();

    println!("=== POST Request Example ===");
    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };
    let response = client
        .request(RequestConfig::post("/posts").json(&new_post)?)
        .await?;

    let envelope = if response.is_success() {
        Envelope::success("Post created", response.json::<serde_json::Value>()?)
    } else {
        Envelope::error(format!("Upstream answered {}", response.status))
    };
    println!("{}", json::pretty_print(&envelope)?);

    Ok(())
}
