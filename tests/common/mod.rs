//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use translation_coordinator::config::CoordinatorConfig;
use translation_coordinator::translation::{TranslateError, Translator};

/// Config with fast retries and no cache, suitable for tests.
pub fn test_config() -> CoordinatorConfig {
    let mut config = CoordinatorConfig::default();
    config.workers.count = 2;
    config.retries.max_attempts = 3;
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 100;
    config.retries.attempt_timeout_ms = 1_000;
    config.retries.jitter = false;
    config.breaker.fail_max = 5;
    config.breaker.timeout_secs = 60;
    config.cache.enabled = false;
    config
}

/// A translator that always fails and counts its invocations.
#[derive(Debug, Default)]
pub struct FailingTranslator {
    pub calls: AtomicU32,
}

impl FailingTranslator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for FailingTranslator {
    fn name(&self) -> &str {
        "failing"
    }

    async fn translate(&self, _: &str, _: &str, _: &str) -> Result<String, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TranslateError::Failure("service down".into()))
    }
}

/// A translator that fails the first `failures` calls and then echoes a
/// fixed translation.
#[derive(Debug)]
pub struct FlakyTranslator {
    name: &'static str,
    failures: u32,
    reply: &'static str,
    pub calls: AtomicU32,
}

impl FlakyTranslator {
    pub fn new(name: &'static str, failures: u32, reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            failures,
            reply,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for FlakyTranslator {
    fn name(&self) -> &str {
        self.name
    }

    async fn translate(&self, _: &str, _: &str, _: &str) -> Result<String, TranslateError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(TranslateError::Failure(format!("transient failure {}", call + 1)))
        } else {
            Ok(self.reply.to_string())
        }
    }
}

/// A translator that takes `delay` per call and then succeeds.
#[derive(Debug)]
pub struct SlowTranslator {
    delay: Duration,
    reply: &'static str,
    pub calls: AtomicU32,
}

impl SlowTranslator {
    pub fn new(delay: Duration, reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            delay,
            reply,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for SlowTranslator {
    fn name(&self) -> &str {
        "slow"
    }

    async fn translate(&self, _: &str, _: &str, _: &str) -> Result<String, TranslateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.reply.to_string())
    }
}
