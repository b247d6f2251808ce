use std::time::Duration;

use anyhow::{
  Context,
  anyhow
};
use serde::de::DeserializeOwned;
use tracing::{
  debug,
  instrument
};

use crate::model::{
  Color,
  ListRecord,
  Task,
  TaskId,
  TaskPatch
};
use crate::sync::DataService;

const LISTS_QUERY: &str =
  "lists?_expand=color&_embed=tasks";

/// json-server style REST client.
#[derive(Debug, Clone)]
pub struct HttpDataService {
  client: reqwest::Client,
  base:   String
}

impl HttpDataService {
  pub fn new(
    base_url: &str,
    timeout: Option<Duration>
  ) -> anyhow::Result<Self> {
    let base =
      base_url.trim().trim_end_matches('/');
    if base.is_empty() {
      anyhow::bail!(
        "service URL is empty"
      );
    }

    let mut builder =
      reqwest::Client::builder();
    if let Some(timeout) = timeout {
      builder = builder.timeout(timeout);
    }
    let client = builder.build().context(
      "failed building HTTP client for \
       data service"
    )?;

    Ok(Self {
      client,
      base: base.to_string()
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.base, path)
  }

  #[instrument(skip(self))]
  async fn get_json<T>(
    &self,
    path: &str
  ) -> anyhow::Result<T>
  where
    T: DeserializeOwned
  {
    let url = self.url(path);
    let response = self
      .client
      .get(&url)
      .header(
        reqwest::header::ACCEPT,
        "application/json"
      )
      .send()
      .await
      .with_context(|| {
        format!("failed requesting {url}")
      })?;

    let status = response.status();
    let body =
      response.text().await.with_context(
        || {
          format!(
            "failed reading response \
             body for {url}"
          )
        }
      )?;
    if !status.is_success() {
      return Err(anyhow!(
        "GET {url} returned {status}"
      ));
    }

    debug!(url = %url, bytes = body.len(), "fetched collection");
    serde_json::from_str(&body)
      .with_context(|| {
        format!(
          "failed decoding response \
           from {url}"
        )
      })
  }
}

impl DataService for HttpDataService {
  async fn fetch_lists(
    &self
  ) -> anyhow::Result<Vec<ListRecord>> {
    self.get_json(LISTS_QUERY).await
  }

  async fn fetch_colors(
    &self
  ) -> anyhow::Result<Vec<Color>> {
    self.get_json("colors").await
  }

  async fn fetch_tasks(
    &self
  ) -> anyhow::Result<Vec<Task>> {
    self.get_json("tasks").await
  }

  #[instrument(skip(self))]
  async fn patch_task(
    &self,
    id: TaskId,
    patch: TaskPatch
  ) -> anyhow::Result<()> {
    let url = self.url(&format!("tasks/{id}"));
    let body = serde_json::to_string(
      &patch
    )
    .context("failed encoding task patch")?;

    let status = self
      .client
      .patch(&url)
      .header(
        reqwest::header::CONTENT_TYPE,
        "application/json"
      )
      .body(body)
      .send()
      .await
      .with_context(|| {
        format!("failed requesting {url}")
      })?
      .status();

    if status.is_success() {
      Ok(())
    } else {
      Err(anyhow!(
        "PATCH {url} returned {status}"
      ))
    }
  }

  #[instrument(skip(self))]
  async fn delete_task(
    &self,
    id: TaskId
  ) -> anyhow::Result<()> {
    let url = self.url(&format!("tasks/{id}"));
    let status = self
      .client
      .delete(&url)
      .send()
      .await
      .with_context(|| {
        format!("failed requesting {url}")
      })?
      .status();

    if status.is_success() {
      Ok(())
    } else {
      Err(anyhow!(
        "DELETE {url} returned {status}"
      ))
    }
  }
}
