pub mod entry;
pub mod job;
pub mod queue;
pub mod scanner;
pub mod walker;

pub use entry::{DirectoryEntry, DirectoryReader, DroppedEntry, FileEntry, LocalDirectory};
pub use job::{FileData, Job, JobKind, SourceFile};
pub use queue::ExecutionQueue;
pub use scanner::scan_folder;
pub use walker::walk;
