mod watcher;

pub use watcher::{diff, InstanceChange, WatchMessage, Watcher};
