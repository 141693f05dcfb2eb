use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::media::{
    pipe::{Pipe, PipeConfig},
    transform::FrameTransform,
};

/// Running pipelines by id. Every pipe's token is a child of the manager's,
/// so cancelling the manager stops them all.
pub struct PipeManager {
    pipes: RwLock<HashMap<String, Arc<Pipe>>>,
    cancel: CancellationToken,
}

impl PipeManager {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            pipes: RwLock::new(HashMap::new()),
            cancel,
        }
    }

    /// Register and start a pipe. An existing id is an error unless
    /// `update_if_exists`, in which case the old pipe is cancelled first.
    /// `transform` runs after the pipe's effect.
    pub async fn add_pipe(
        &self,
        id: &str,
        config: PipeConfig,
        transform: Option<Arc<dyn FrameTransform>>,
        update_if_exists: bool,
    ) -> anyhow::Result<Arc<Pipe>> {
        let mut pipes = self.pipes.write().await;
        if pipes.contains_key(id) {
            if !update_if_exists {
                return Err(anyhow::anyhow!("Pipe {} already exists", id));
            } else if let Some(pipe) = pipes.remove(id) {
                pipe.cancel();
            }
        }
        let mut pipe = Pipe::with_cancel(config, self.cancel.child_token());
        if let Some(transform) = transform {
            pipe = pipe.with_transform(transform);
        }
        let pipe = Arc::new(pipe);
        pipes.insert(id.to_string(), Arc::clone(&pipe));

        let runner = Arc::clone(&pipe);
        let id = id.to_string();
        tokio::spawn(async move {
            match runner.start().await {
                Ok(report) => log::info!("pipe {}: {}", id, report),
                Err(e) => log::warn!("pipe {}: {:#}", id, e),
            }
        });
        Ok(pipe)
    }

    /// Cancel and forget a pipe. Returns whether it existed.
    pub async fn remove_pipe(&self, id: &str) -> bool {
        let mut pipes = self.pipes.write().await;
        match pipes.remove(id) {
            Some(pipe) => {
                pipe.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn get_pipe(&self, id: &str) -> Option<Arc<Pipe>> {
        self.pipes.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.pipes.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn cancel_all(&self) {
        let mut pipes = self.pipes.write().await;
        for (id, pipe) in pipes.drain() {
            log::info!("stopping pipe {}", id);
            pipe.cancel();
        }
    }
}
