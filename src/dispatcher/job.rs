use std::fmt;
use std::path::PathBuf;

/// The kind of a job, used as the routing key and as the summary table key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Directory,
    File,
    Web,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::File => "file",
            Self::Web => "web",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directory discovered as a corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryPayload {
    pub corpus_name: String,
    pub path: PathBuf,
    /// Total byte size of the regular files below `path`
    pub size: u64,
}

/// A single file belonging to a directory corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePayload {
    pub corpus_name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// A web page to fetch on behalf of a corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebPayload {
    pub corpus_name: String,
    pub url: String,
    /// Remaining link-following budget; zero means fetch but do not expand
    pub hop_count: u32,
}

/// A unit of work travelling through the router
///
/// The kind is derived from the variant, so a job cannot carry a payload that
/// disagrees with its queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    Directory(DirectoryPayload),
    File(FilePayload),
    Web(WebPayload),
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Directory(_) => JobKind::Directory,
            Self::File(_) => JobKind::File,
            Self::Web(_) => JobKind::Web,
        }
    }

    pub fn corpus_name(&self) -> &str {
        match self {
            Self::Directory(payload) => &payload.corpus_name,
            Self::File(payload) => &payload.corpus_name,
            Self::Web(payload) => &payload.corpus_name,
        }
    }
}

impl From<DirectoryPayload> for Job {
    fn from(payload: DirectoryPayload) -> Self {
        Self::Directory(payload)
    }
}

impl From<FilePayload> for Job {
    fn from(payload: FilePayload) -> Self {
        Self::File(payload)
    }
}

impl From<WebPayload> for Job {
    fn from(payload: WebPayload) -> Self {
        Self::Web(payload)
    }
}
