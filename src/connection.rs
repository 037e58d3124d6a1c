use crate::controller::snapshot_file::SnapshotFile;
use crate::controller::{self, Controller};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not open the controller")]
    Open(#[source] controller::Error),
    #[error("controller connection task failed")]
    Task(#[source] tokio::task::JoinError),
}

#[derive(clap::Parser, Clone)]
#[group(id = "connection::Args")]
pub struct Args {
    /// Use the controller state recorded in a JSON document.
    ///
    /// The document is re-read on every poll and writes are applied back into it.
    #[arg(long)]
    snapshot: PathBuf,
}

impl Args {
    pub async fn connect(&self) -> Result<Arc<dyn Controller>, Error> {
        let path = self.snapshot.clone();
        let controller = tokio::task::spawn_blocking(move || SnapshotFile::open(&path))
            .await
            .map_err(Error::Task)?
            .map_err(Error::Open)?;
        Ok(Arc::new(controller))
    }
}
