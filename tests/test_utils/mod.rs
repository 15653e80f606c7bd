#![allow(dead_code)]
//! Shared fixtures for forumwatch integration tests

use anyhow::Result;
use async_trait::async_trait;
use forumwatch::config::HttpConfig;
use forumwatch::data::{Notification, NotificationKind};
use forumwatch::integrations::build_client;
use forumwatch::notify::Notifier;
use std::sync::Mutex;

/// Notifier that keeps every message for later assertions
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent().iter().map(|n| n.kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, kind: NotificationKind, title: &str, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(Notification::new(kind, title, text));
        Ok(())
    }
}

pub fn http_client() -> reqwest::Client {
    build_client(&HttpConfig::default(), false).expect("Failed to build client")
}
