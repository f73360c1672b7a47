//! CGI collaborator interface
//!
//! Process execution is left to the embedding application. The engine only
//! maps URLs to scripts and calls the executor once the full request body
//! has been assembled.

use bytes::Bytes;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use crate::http::{Headers, HttpMethod};
use crate::sync::{read, write};

/// Everything a CGI runner needs to build the script environment
#[derive(Debug, Clone)]
pub struct CgiRequest {
    pub script: PathBuf,
    pub method: HttpMethod,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: Headers,
    pub remote_addr: Option<SocketAddr>,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct CgiOutput {
    pub content_type: String,
    pub body: Bytes,
}

pub trait CgiExecutor: Send + Sync {
    fn execute(&self, request: &CgiRequest) -> anyhow::Result<CgiOutput>;
}

impl std::fmt::Debug for dyn CgiExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CgiExecutor")
    }
}

/// URL to script table
#[derive(Default)]
pub struct CgiScripts {
    scripts: RwLock<HashMap<String, PathBuf>>,
    executor: RwLock<Option<Arc<dyn CgiExecutor>>>,
}

impl CgiScripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_executor(&self, executor: Arc<dyn CgiExecutor>) {
        *write(&self.executor) = Some(executor);
    }

    pub fn register(&self, url: impl Into<String>, script: impl Into<PathBuf>) {
        write(&self.scripts).insert(url.into(), script.into());
    }

    /// Script and executor for `path`, if both exist
    pub fn lookup(&self, path: &str) -> Option<(PathBuf, Arc<dyn CgiExecutor>)> {
        let script = read(&self.scripts).get(path).cloned()?;
        let executor = read(&self.executor).clone()?;
        Some((script, executor))
    }
}

impl std::fmt::Debug for CgiScripts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CgiScripts")
            .field("scripts", &*read(&self.scripts))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl CgiExecutor for Echo {
        fn execute(&self, request: &CgiRequest) -> anyhow::Result<CgiOutput> {
            Ok(CgiOutput { content_type: "text/plain".into(), body: request.body.clone() })
        }
    }

    #[test]
    fn test_lookup_needs_executor() {
        let scripts = CgiScripts::new();
        scripts.register("/cgi-bin/echo", "/srv/cgi/echo.sh");
        assert!(scripts.lookup("/cgi-bin/echo").is_none());

        scripts.set_executor(Arc::new(Echo));
        let (script, executor) = scripts.lookup("/cgi-bin/echo").unwrap();
        assert_eq!(script, PathBuf::from("/srv/cgi/echo.sh"));

        let output = executor
            .execute(&CgiRequest {
                script,
                method: HttpMethod::POST,
                path: "/cgi-bin/echo".into(),
                query: HashMap::new(),
                headers: Headers::new(),
                remote_addr: None,
                body: Bytes::from_static(b"ping"),
            })
            .unwrap();
        assert_eq!(output.body, Bytes::from_static(b"ping"));
        assert!(scripts.lookup("/cgi-bin/other").is_none());
    }
}
