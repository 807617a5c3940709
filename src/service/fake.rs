//! Scripted in-memory [`DocumentService`] for unit tests.
//!
//! Poll states and generation answers are consumed from FIFO queues; once a
//! queue is empty the fake answers READY / a valid invoice JSON. Every call is
//! counted so tests can assert exact poll, attempt, and release counts.

use super::{DocumentService, FileState, RemoteFile};
use crate::error::ServiceError;
use crate::pipeline::input::SourceDocument;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) const VALID_JSON: &str = r#"{"numero_contrato":"A1","nit_empresa":"900-1","nombre_empresa":"Acme","fecha_expedicion":"2024-01-01","fecha_limite":"2024-02-01","valor_pagar":150000}"#;

#[derive(Default)]
pub(crate) struct FakeService {
    upload_error: Mutex<Option<ServiceError>>,
    upload_state: Mutex<Option<FileState>>,
    poll_states: Mutex<VecDeque<Result<FileState, ServiceError>>>,
    responses: Mutex<VecDeque<Result<String, ServiceError>>>,
    models: Mutex<Option<Result<Vec<String>, ServiceError>>>,
    fail_delete: bool,
    uploads: AtomicUsize,
    polls: AtomicUsize,
    generates: AtomicUsize,
    deletes: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    uploaded_names: Mutex<Vec<String>>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn edit(self: Arc<Self>, f: impl FnOnce(&mut Self)) -> Arc<Self> {
        let mut inner = Arc::try_unwrap(self).unwrap_or_else(|_| panic!("fake already shared"));
        f(&mut inner);
        Arc::new(inner)
    }

    pub fn failing_upload(self: Arc<Self>, err: ServiceError) -> Arc<Self> {
        self.edit(|s| *s.upload_error.get_mut().unwrap() = Some(err))
    }

    pub fn upload_state(self: Arc<Self>, state: FileState) -> Arc<Self> {
        self.edit(|s| *s.upload_state.get_mut().unwrap() = Some(state))
    }

    pub fn poll_states(self: Arc<Self>, states: Vec<Result<FileState, ServiceError>>) -> Arc<Self> {
        self.edit(|s| s.poll_states.get_mut().unwrap().extend(states))
    }

    pub fn pending_polls(self: Arc<Self>, k: usize) -> Arc<Self> {
        self.poll_states((0..k).map(|_| Ok(FileState::Pending)).collect())
    }

    pub fn responses(self: Arc<Self>, responses: Vec<Result<String, ServiceError>>) -> Arc<Self> {
        self.edit(|s| s.responses.get_mut().unwrap().extend(responses))
    }

    pub fn models(self: Arc<Self>, models: Result<Vec<String>, ServiceError>) -> Arc<Self> {
        self.edit(|s| *s.models.get_mut().unwrap() = Some(models))
    }

    pub fn failing_delete(self: Arc<Self>) -> Arc<Self> {
        self.edit(|s| s.fail_delete = true)
    }

    pub fn upload_calls(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generates.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn uploaded_names(&self) -> Vec<String> {
        self.uploaded_names.lock().unwrap().clone()
    }

    fn file(name: String, state: FileState) -> RemoteFile {
        RemoteFile {
            uri: format!("https://fake.test/v1beta/{name}"),
            name,
            mime_type: "application/pdf".into(),
            state,
        }
    }
}

#[async_trait]
impl DocumentService for FakeService {
    async fn upload(&self, document: &SourceDocument) -> Result<RemoteFile, ServiceError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        self.uploaded_names.lock().unwrap().push(document.name.clone());
        if let Some(err) = self.upload_error.lock().unwrap().clone() {
            return Err(err);
        }
        let state = self.upload_state.lock().unwrap().unwrap_or(FileState::Pending);
        Ok(Self::file(format!("files/f{n}"), state))
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, ServiceError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let next = self.poll_states.lock().unwrap().pop_front();
        let state = next.unwrap_or(Ok(FileState::Ready))?;
        Ok(Self::file(name.to_string(), state))
    }

    async fn generate(
        &self,
        _model: &str,
        _file: &RemoteFile,
        _instruction: &str,
        _temperature: f32,
    ) -> Result<String, ServiceError> {
        self.generates.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(VALID_JSON.to_string()))
    }

    async fn delete_file(&self, name: &str) -> Result<(), ServiceError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete {
            return Err(ServiceError::http(500, Some("INTERNAL".into()), "delete failed"));
        }
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<String>, ServiceError> {
        self.models
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(vec!["models/gemini-1.5-flash".into()]))
    }
}
