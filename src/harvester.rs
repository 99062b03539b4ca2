use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::connector::DataConnector;
use crate::store::{DocumentStore, VariableStore};
use crate::tasks::{Task, TasksReader};

const LAST_SYNCED_TIMESTAMP: &str = "last_synced_timestamp";

/// Counts of what happened during one harvest cycle.
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub fetched: u64,
    pub deleted: u64,
    pub failed: u64,
    pub cancelled: bool,
    pub watermark: Option<String>,
}

/// Bounded-concurrency fan-out of fetch tasks plus checkpointing,
/// equivalent to the reference implementation's `Synchronizer`/`PoisonPill`
/// pair, reimplemented with OS threads and a bounded channel instead of a
/// `ThreadPoolExecutor`.
pub struct Harvester<'c> {
    connector: &'c DataConnector<'c>,
    reader: TasksReader,
    store: &'c dyn DocumentStore,
    variables: &'c dyn VariableStore,
    concurrency: usize,
}

impl<'c> Harvester<'c> {
    pub fn new(
        connector: &'c DataConnector<'c>,
        store: &'c dyn DocumentStore,
        variables: &'c dyn VariableStore,
        concurrency: usize,
    ) -> Self {
        Harvester {
            connector,
            reader: TasksReader::new(),
            store,
            variables,
            concurrency: concurrency.max(1),
        }
    }

    /// Runs one harvest cycle. `since`, when non-empty, overrides the
    /// stored watermark. `poisoned` lets a caller (e.g. a SIGINT handler)
    /// signal early cancellation; workers stop picking up new tasks once
    /// set, and the watermark is left untouched so the next cycle redoes
    /// the unfinished work.
    pub fn sync(&self, since: &str, poisoned: Arc<AtomicBool>) -> anyhow::Result<SyncReport> {
        let since = if !since.is_empty() {
            since.to_string()
        } else {
            self.variables.fetch(LAST_SYNCED_TIMESTAMP, "")?
        };

        eprintln!(
            "starting to sync records from remote since \"{}\"",
            if since.is_empty() { "the very beginning" } else { since.as_str() }
        );

        let changelog = self.connector.changes(&since)?;
        let tasks = self.reader.read(changelog);

        let mut report = self.get_docs(tasks.docs_to_get(), &poisoned);
        report.deleted = self.delete_docs(tasks.docs_to_del(), &poisoned);
        report.cancelled = poisoned.load(Ordering::SeqCst);
        report.watermark = tasks.timestamp.clone();

        if !report.cancelled {
            if let Some(watermark) = &tasks.timestamp {
                self.variables.upsert(LAST_SYNCED_TIMESTAMP, watermark)?;
            }
        }

        Ok(report)
    }

    fn delete_docs(&self, to_delete: Vec<Task>, poisoned: &Arc<AtomicBool>) -> u64 {
        let mut deleted = 0;
        for task in to_delete {
            if poisoned.load(Ordering::SeqCst) {
                break;
            }
            match self.store.delete(&task.id) {
                Ok(()) => deleted += 1,
                Err(err) => eprintln!("could not delete \"{}\": {err:#}", task.id),
            }
        }
        deleted
    }

    fn get_docs(&self, to_get: Vec<Task>, poisoned: &Arc<AtomicBool>) -> SyncReport {
        let mut report = SyncReport::default();
        if to_get.is_empty() {
            return report;
        }

        let worker_count = self.concurrency.min(to_get.len());
        let (task_tx, task_rx): (Sender<Task>, Receiver<Task>) = bounded(to_get.len());
        let (result_tx, result_rx): (Sender<Option<crate::record::Record>>, Receiver<Option<crate::record::Record>>) =
            bounded(to_get.len());

        for task in to_get {
            task_tx.send(task).expect("channel sized for all tasks");
        }
        drop(task_tx);

        std::thread::scope(|scope| {
            for _ in 0..worker_count {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                let poisoned = Arc::clone(poisoned);
                scope.spawn(move || {
                    while let Ok(task) = task_rx.recv() {
                        if poisoned.load(Ordering::SeqCst) {
                            let _ = result_tx.send(None);
                            continue;
                        }
                        match self.connector.doc_metadata(&task.id) {
                            Ok(record) => {
                                let _ = result_tx.send(Some(record));
                            }
                            Err(err) => {
                                eprintln!("could not sync \"{}\": {err:#}", task.id);
                                let _ = result_tx.send(None);
                            }
                        }
                    }
                });
            }
            drop(result_tx);

            for result in result_rx {
                match result {
                    Some(record) => match self.store.upsert(&record) {
                        Ok(()) => report.fetched += 1,
                        Err(err) => {
                            eprintln!("could not store \"{}\": {err:#}", record.doc_id);
                            report.failed += 1;
                        }
                    },
                    None => report.failed += 1,
                }
            }
        });

        report
    }
}
