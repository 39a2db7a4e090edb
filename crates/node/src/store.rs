//! Persistence tier for received posts.
//!
//! Delivery is at-most-once: a failed [`PostStore::create_post`] call is
//! reported to the caller and never retried here.

use core::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use postmesh_primitives::common::serde_duration;
use postmesh_primitives::post::{Post, PostId};

pub const DEFAULT_GRAPHQL_ENDPOINT: &str = "http://localhost:4002/graphql";

const CREATE_POST_MUTATION: &str = "\
mutation CreatePost($title: String!, $content: String!, $userId: String!) {
  createPost(title: $title, content: $content, userId: $userId) {
    id
  }
}";

#[async_trait]
pub trait PostStore: Send + Sync {
    async fn create_post(&self, post: &Post) -> Result<PostId, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persistence request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("persistence endpoint answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("persistence endpoint rejected the post: {}", .0.join("; "))]
    Graphql(Vec<String>),
    #[error("persistence endpoint returned no post id")]
    MissingData,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub endpoint: Url,
    #[serde(rename = "request_timeout_ms", with = "serde_duration")]
    pub request_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_GRAPHQL_ENDPOINT).expect("valid default endpoint"),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// [`PostStore`] backed by the posts service `createPost` mutation.
#[derive(Clone, Debug)]
pub struct GraphqlStore {
    client: Client,
    endpoint: Url,
}

impl GraphqlStore {
    pub fn new(endpoint: Url, request_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self { client, endpoint })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::new(config.endpoint.clone(), config.request_timeout)
    }

    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'static str,
    variables: CreatePostVariables<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePostVariables<'a> {
    title: &'a str,
    content: &'a str,
    user_id: &'a str,
}

#[derive(Deserialize)]
struct GraphqlResponse {
    data: Option<CreatePostData>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePostData {
    create_post: Option<CreatedPost>,
}

#[derive(Deserialize)]
struct CreatedPost {
    id: PostId,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[async_trait]
impl PostStore for GraphqlStore {
    async fn create_post(&self, post: &Post) -> Result<PostId, StoreError> {
        let request = GraphqlRequest {
            query: CREATE_POST_MUTATION,
            variables: CreatePostVariables {
                title: &post.title,
                content: &post.content,
                user_id: &post.user_id,
            },
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }

        let response: GraphqlResponse = response.json().await?;

        if !response.errors.is_empty() {
            return Err(StoreError::Graphql(
                response.errors.into_iter().map(|e| e.message).collect(),
            ));
        }

        let id = response
            .data
            .and_then(|data| data.create_post)
            .map(|created| created.id)
            .ok_or(StoreError::MissingData)?;

        debug!(post_id = %id, endpoint = %self.endpoint, "Post persisted");

        Ok(id)
    }
}
