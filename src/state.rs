use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::ai::extraction::FieldExtractor;
use crate::services::thread_lock::ThreadLocks;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub extractor: Box<dyn FieldExtractor>,
    pub thread_locks: ThreadLocks,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig, extractor: Box<dyn FieldExtractor>) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            extractor,
            thread_locks: ThreadLocks::new(),
        }
    }
}
