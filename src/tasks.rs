use std::collections::HashMap;

/// A single entry from the upstream changelog.
#[derive(Debug, Clone)]
pub struct ChangelogEntry {
    pub id: String,
    pub timestamp: String,
    pub deleted: bool,
}

impl ChangelogEntry {
    pub fn modified(id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        ChangelogEntry {
            id: id.into(),
            timestamp: timestamp.into(),
            deleted: false,
        }
    }

    pub fn deleted(id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        ChangelogEntry {
            id: id.into(),
            timestamp: timestamp.into(),
            deleted: true,
        }
    }
}

/// Final action to take for a document, after reducing every changelog
/// event seen for its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Get,
    Delete,
}

/// The reduction state machine's two states. A document starts in
/// `Enqueued` and the first event is applied immediately, so a document
/// whose very first event is a deletion still ends up `Deleted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskState {
    Enqueued,
    Deleted,
}

impl TaskState {
    fn on_event(self, deleted: bool) -> TaskState {
        if deleted {
            TaskState::Deleted
        } else {
            TaskState::Enqueued
        }
    }

    fn action(self) -> Action {
        match self {
            TaskState::Enqueued => Action::Get,
            TaskState::Deleted => Action::Delete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub action: Action,
}

/// A document id shaped like `/documents/{id}` is the only kind of task
/// this provider cares about; everything else (e.g. `/journals/...`) is
/// noise that the reducer still tracks but the `docs*` views drop.
fn is_document_task(id: &str) -> bool {
    match id.strip_prefix("/documents/") {
        Some(rest) if !rest.is_empty() => {
            rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        }
        _ => false,
    }
}

/// The reduced output of a changelog: one task per distinct id, in
/// first-seen order, plus the watermark timestamp of the last entry
/// observed.
#[derive(Debug, Clone, Default)]
pub struct Tasks {
    pub items: Vec<Task>,
    pub timestamp: Option<String>,
}

impl Tasks {
    pub fn docs(&self) -> Vec<Task> {
        self.items
            .iter()
            .filter(|t| is_document_task(&t.id))
            .cloned()
            .collect()
    }

    pub fn docs_to_get(&self) -> Vec<Task> {
        self.docs()
            .into_iter()
            .filter(|t| t.action == Action::Get)
            .collect()
    }

    pub fn docs_to_del(&self) -> Vec<Task> {
        self.docs()
            .into_iter()
            .filter(|t| t.action == Action::Delete)
            .collect()
    }
}

/// Drives the reduction state machine over an ordered changelog stream.
#[derive(Default)]
pub struct TasksReader;

impl TasksReader {
    pub fn new() -> Self {
        TasksReader
    }

    /// Reduces `changelog` into a `Tasks` value. `changelog` must already be
    /// in upstream delivery order; the reducer relies only on relative
    /// order within it.
    pub fn read(&self, changelog: impl IntoIterator<Item = ChangelogEntry>) -> Tasks {
        let mut states: HashMap<String, TaskState> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut timestamp: Option<String> = None;

        for entry in changelog {
            let state = states
                .entry(entry.id.clone())
                .or_insert(TaskState::Enqueued);
            *state = state.on_event(entry.deleted);
            if !order.contains(&entry.id) {
                order.push(entry.id.clone());
            }
            timestamp = Some(entry.timestamp);
        }

        let items = order
            .into_iter()
            .map(|id| {
                let action = states[&id].action();
                Task { id, action }
            })
            .collect();

        Tasks { items, timestamp }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn modified_twice_ends_enqueued() {
        let reader = TasksReader::new();
        let tasks = reader.read(vec![
            ChangelogEntry::modified(
                "/documents/0034-8910-rsp-48-2-0347",
                "2018-08-05 23:03:44.971230Z",
            ),
            ChangelogEntry::modified(
                "/documents/0034-8910-rsp-48-2-0347",
                "2018-08-06 08:02:23.743451Z",
            ),
        ]);
        assert_eq!(
            tasks.items,
            vec![Task {
                id: "/documents/0034-8910-rsp-48-2-0347".into(),
                action: Action::Get,
            }]
        );
    }

    #[test]
    fn modified_then_deleted_ends_deleted() {
        let reader = TasksReader::new();
        let tasks = reader.read(vec![
            ChangelogEntry::modified("/documents/abc", "t1"),
            ChangelogEntry::deleted("/documents/abc", "t2"),
        ]);
        assert_eq!(
            tasks.items,
            vec![Task {
                id: "/documents/abc".into(),
                action: Action::Delete,
            }]
        );
    }

    #[test]
    fn preserves_first_seen_order_across_two_documents() {
        let reader = TasksReader::new();
        let tasks = reader.read(vec![
            ChangelogEntry::modified("/documents/a", "t1"),
            ChangelogEntry::deleted("/documents/b", "t2"),
        ]);
        assert_eq!(
            tasks.items,
            vec![
                Task {
                    id: "/documents/a".into(),
                    action: Action::Get,
                },
                Task {
                    id: "/documents/b".into(),
                    action: Action::Delete,
                },
            ]
        );
        assert_eq!(tasks.timestamp, Some("t2".to_string()));
    }

    #[test]
    fn non_document_tasks_are_filtered_out_of_docs() {
        let reader = TasksReader::new();
        let tasks = reader.read(vec![
            ChangelogEntry::modified("/journals/1234-5678", "t1"),
            ChangelogEntry::modified("/documents/a", "t2"),
        ]);
        assert_eq!(tasks.items.len(), 2);
        assert_eq!(tasks.docs().len(), 1);
        assert_eq!(tasks.docs()[0].id, "/documents/a");
    }

    #[test]
    fn empty_changelog_has_no_timestamp() {
        let reader = TasksReader::new();
        let tasks = reader.read(Vec::new());
        assert!(tasks.items.is_empty());
        assert_eq!(tasks.timestamp, None);
    }
}
