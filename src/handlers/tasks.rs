//! In-memory task list: `GET /tasks[?id=]`, `POST`, `PATCH ?id=`, `DELETE ?id=`.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method, StatusCode};
use dashmap::DashMap;
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::http::{Context, HttpError, Reply, Request, Response};
use crate::routing::Handler;

type Task = Map<String, Value>;

#[derive(Clone, Default)]
pub struct Tasks {
    store: Arc<DashMap<String, Task>>,
}

impl Tasks {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self) -> Result<Reply, HttpError> {
        let mut tasks: Vec<Task> = self.store.iter().map(|entry| entry.value().clone()).collect();
        tasks.sort_by(|a, b| created(a).cmp(created(b)));
        Ok(Response::json(&tasks)?.into())
    }

    fn get(&self, id: &str) -> Result<Reply, HttpError> {
        let task = self.store.get(id).ok_or_else(not_found)?;
        Ok(Response::json(task.value())?.into())
    }

    async fn create(&self, request: &Request) -> Result<Reply, HttpError> {
        let body: Value = request.json().await?;
        let Some(title) = body.get("title").and_then(Value::as_str) else {
            return Err(HttpError::bad_request("Title is required"));
        };
        let description = body
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim();

        let id = uuid::Uuid::new_v4().to_string();
        let mut task = Task::new();
        task.insert("id".into(), Value::from(id.as_str()));
        task.insert("title".into(), Value::from(title.trim()));
        task.insert("description".into(), Value::from(description));
        task.insert("created".into(), Value::from(now()?));
        task.insert("completed".into(), Value::Bool(false));

        let mut response = Response::json(&task)?;
        response.set_status(StatusCode::CREATED);
        let location = HeaderValue::from_str(&format!("/tasks?id={id}"))
            .map_err(|_| HttpError::internal("invalid task location"))?;
        response.headers_mut().insert(header::LOCATION, location);

        self.store.insert(id, task);
        Ok(response.into())
    }

    async fn update(&self, request: &Request, id: &str) -> Result<Reply, HttpError> {
        if !self.store.contains_key(id) {
            return Err(not_found());
        }
        let Value::Object(updates) = request.json::<Value>().await? else {
            return Err(HttpError::bad_request("Expected a JSON object"));
        };
        let mut task = self.store.get_mut(id).ok_or_else(not_found)?;
        task.extend(updates);
        task.insert("id".into(), Value::from(id));
        task.insert("modified".into(), Value::from(now()?));
        Ok(Response::json(&*task)?.into())
    }

    fn delete(&self, id: &str) -> Result<Reply, HttpError> {
        self.store.remove(id).ok_or_else(not_found)?;
        Ok(Response::with_status(StatusCode::NO_CONTENT).into())
    }
}

impl Handler for Tasks {
    fn call<'a>(&'a self, request: &'a Request, context: &'a Context) -> BoxFuture<'a, Result<Reply, HttpError>> {
        async move {
            let id = context.search_param("id");
            match (request.method().clone(), id) {
                (Method::GET, Some(id)) => self.get(&id),
                (Method::GET, None) => self.list(),
                (Method::POST, _) => self.create(request).await,
                (Method::PATCH, Some(id)) => self.update(request, &id).await,
                (Method::DELETE, Some(id)) => self.delete(&id),
                (Method::PATCH | Method::DELETE, None) => Err(not_found()),
                _ => Err(HttpError::new(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
                    .with_header(header::ALLOW, HeaderValue::from_static("GET, POST, PATCH, DELETE"))),
            }
        }
        .boxed()
    }
}

fn created(task: &Task) -> &str {
    task.get("created").and_then(Value::as_str).unwrap_or("")
}

fn not_found() -> HttpError {
    HttpError::not_found("Task not found")
}

fn now() -> Result<String, HttpError> {
    OffsetDateTime::now_utc().format(&Rfc3339).map_err(HttpError::contract)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::abort::AbortController;
    use crate::http::context::tests::context;
    use axum::http::HeaderMap;
    use bytes::Bytes;
    use futures_util::{stream, StreamExt};
    use url::Url;

    fn request(method: Method, url: &str, body: Option<&'static str>) -> Request {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let body = body.map(|text| stream::iter([Ok::<_, HttpError>(Bytes::from_static(text.as_bytes()))]).boxed());
        Request::new(method, Url::parse(url).unwrap(), headers, body, AbortController::new().signal())
    }

    async fn call(tasks: &Tasks, method: Method, url: &str, body: Option<&'static str>) -> Result<Response, HttpError> {
        match tasks.call(&request(method, url, body), &context(url)).await? {
            Reply::Response(response) => Ok(response),
            Reply::Redirect(_) => panic!("unexpected redirect"),
        }
    }

    async fn json(mut response: Response) -> Value {
        serde_json::from_slice(&response.take_body().collect().await.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn create_read_update_delete() {
        let tasks = Tasks::new();
        let created = call(&tasks, Method::POST, "http://localhost/tasks", Some(r#"{"title":" Write docs "}"#))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let location = created.headers()[header::LOCATION].to_str().unwrap().to_string();
        let task = json(created).await;
        assert_eq!(task["title"], "Write docs");
        assert_eq!(task["completed"], false);
        let id = task["id"].as_str().unwrap().to_string();
        assert_eq!(location, format!("/tasks?id={id}"));

        let url = format!("http://localhost/tasks?id={id}");
        let updated = call(&tasks, Method::PATCH, &url, Some(r#"{"completed":true,"id":"x"}"#))
            .await
            .unwrap();
        let task = json(updated).await;
        assert_eq!(task["completed"], true);
        assert_eq!(task["id"], id.as_str());
        assert!(task["modified"].is_string());

        let list = json(call(&tasks, Method::GET, "http://localhost/tasks", None).await.unwrap()).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let deleted = call(&tasks, Method::DELETE, &url, None).await.unwrap();
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
        let err = call(&tasks, Method::GET, &url, None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let tasks = Tasks::new();
        let err = call(&tasks, Method::POST, "http://localhost/tasks", Some(r#"{"name":"x"}"#))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = call(&tasks, Method::PUT, "http://localhost/tasks", None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(err.headers()[header::ALLOW], "GET, POST, PATCH, DELETE");
    }
}
