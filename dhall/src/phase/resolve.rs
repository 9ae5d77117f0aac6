//! The import resolver. Walks an expression, replaces every import with
//! the (typechecked, normalized) expression it denotes, and enforces the
//! protections around that: loop detection through the parent chain, a
//! depth limit, integrity checks against the semantic hash, the
//! referential-transparency rule for remote imports, and a deadline
//! propagated to every fetch.
//!
//! All I/O goes through injected capabilities: four batch fetchers plus
//! the concrete-grammar parser. Sibling imports are deduplicated and
//! handed to the capability in one batch per protocol per resolution
//! step; whether the batch is fetched in parallel is the capability's
//! business.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use sha2::{Digest, Sha256};
use tracing::{debug, trace, warn};

use dhall_syntax::*;

use crate::error::{Error, ImportError, ParseError};
use crate::phase::binary;
use crate::phase::normalize::normalize;
use crate::phase::typecheck::type_of;

pub const DEFAULT_DEPTH_LIMIT: usize = 50;
const DEFAULT_IPFS_GATEWAY: &str = "cloudflare-ipfs.com";

/// One remote request, with its resolved custom headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// Why a single fetch failed; the capability reports these per input.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub status: Option<u16>,
    pub cause: String,
}

pub type FetchOutcome<T> = Result<T, FetchFailure>;

/// The injected I/O surface. Each method receives the whole deduplicated
/// batch for one protocol and returns one outcome per input, in order.
/// Remote reads receive the parent's origin so they can perform the
/// cross-origin preflight when it differs from the target's.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn read_path(
        &self,
        paths: &[PathBuf],
        budget: Option<Duration>,
    ) -> Vec<FetchOutcome<Vec<u8>>>;

    async fn read_env(
        &self,
        vars: &[String],
        budget: Option<Duration>,
    ) -> Vec<FetchOutcome<String>>;

    async fn read_http(
        &self,
        requests: &[HttpRequest],
        parent_origin: &str,
        budget: Option<Duration>,
    ) -> Vec<FetchOutcome<Vec<u8>>>;

    async fn read_https(
        &self,
        requests: &[HttpRequest],
        parent_origin: &str,
        budget: Option<Duration>,
    ) -> Vec<FetchOutcome<Vec<u8>>>;
}

/// The injected concrete-grammar parser, used for `Code` imports whose
/// bytes are not binary.
pub trait SourceParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<SubExpr, ParseError>;
}

/// Everything a resolution threads along: capabilities, limits, caches.
pub struct Resolver {
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn SourceParser>,
    depth_limit: Option<usize>,
    deadline: Option<Instant>,
    cache: Mutex<HashMap<String, SubExpr>>,
    disk_cache: Option<PathBuf>,
    ipfs_gateway: String,
}

impl Resolver {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        parser: Arc<dyn SourceParser>,
    ) -> Self {
        Resolver {
            fetcher,
            parser,
            depth_limit: Some(DEFAULT_DEPTH_LIMIT),
            deadline: None,
            cache: Mutex::new(HashMap::new()),
            disk_cache: None,
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_owned(),
        }
    }

    /// `None` removes the limit entirely.
    pub fn with_depth_limit(mut self, limit: Option<usize>) -> Self {
        self.depth_limit = limit;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Content-addressed on-disk cache of α-normal forms, keyed by the
    /// integrity hash.
    pub fn with_disk_cache(mut self, dir: PathBuf) -> Self {
        self.disk_cache = Some(dir);
        self
    }

    pub fn with_ipfs_gateway(mut self, gateway: String) -> Self {
        self.ipfs_gateway = gateway;
        self
    }

    /// Resolve every import in `expr`, recursively. `root` is the
    /// location of the expression itself and anchors relative imports.
    pub async fn resolve_expr(
        &self,
        expr: &SubExpr,
        root: &ImportLocation,
    ) -> Result<SubExpr, Error> {
        let chain = vec![root.clone()];
        self.resolve_inner(expr, &chain).await
    }

    fn resolve_inner<'a>(
        &'a self,
        expr: &'a SubExpr,
        chain: &'a [ImportLocation],
    ) -> LocalBoxFuture<'a, Result<SubExpr, Error>> {
        async move {
            let mut imports = Vec::new();
            let mut alts = Vec::new();
            collect_unresolved(expr, &mut imports, &mut alts);
            if imports.is_empty() && alts.is_empty() {
                return Ok(expr.clone());
            }

            let prefetched = self.prefetch(&imports, chain).await?;

            let mut resolved_imports: HashMap<Import, SubExpr> =
                HashMap::new();
            for import in &imports {
                if resolved_imports.contains_key(import) {
                    continue;
                }
                let resolved = self
                    .resolve_import(import, chain, &prefetched)
                    .await?;
                resolved_imports.insert(import.clone(), resolved);
            }

            // `?` tries its left side and falls back on resolution
            // errors only; type and parse errors pass through
            let mut resolved_alts: Vec<(SubExpr, SubExpr)> = Vec::new();
            for alt in &alts {
                if resolved_alts.iter().any(|(k, _)| k == alt) {
                    continue;
                }
                let (l, r) = match alt.as_ref() {
                    Expr::BinOp(BinOp::ImportAlt, l, r) => (l, r),
                    _ => unreachable!(),
                };
                let value = match self.resolve_inner(l, chain).await {
                    Ok(e) => e,
                    Err(Error::Resolve(e)) => {
                        debug!(fallback = %alt, cause = %e, "import fallback");
                        self.resolve_inner(r, chain).await?
                    }
                    Err(e) => return Err(e),
                };
                resolved_alts.push((alt.clone(), value));
            }

            Ok(replace_resolved(expr, &resolved_imports, &resolved_alts))
        }
        .boxed_local()
    }

    /// Fetch the bytes for every cacheable, not-yet-cached import of this
    /// step, one capability call per protocol.
    async fn prefetch(
        &self,
        imports: &[Import],
        chain: &[ImportLocation],
    ) -> Result<HashMap<ImportLocation, FetchOutcome<Vec<u8>>>, Error> {
        let parent = chain.last().expect("the parent chain is never empty");

        let mut paths: Vec<(ImportLocation, PathBuf)> = Vec::new();
        let mut envs: Vec<(ImportLocation, String)> = Vec::new();
        let mut https: Vec<(ImportLocation, HttpRequest)> = Vec::new();
        let mut httpss: Vec<(ImportLocation, HttpRequest)> = Vec::new();

        for import in imports {
            if import.mode == ImportMode::Location {
                continue;
            }
            let canonical = canonicalize(parent, &import.location)?;
            if self.cached(&cache_key(&import.hash, &canonical)).is_some()
            {
                continue;
            }
            match &canonical {
                ImportLocation::Local(_, _) if is_ipfs(&canonical) => {
                    // fetched individually, through the gateway chain
                }
                ImportLocation::Local(_, _) => {
                    if !paths.iter().any(|(l, _)| l == &canonical) {
                        let p = PathBuf::from(canonical.to_string());
                        paths.push((canonical.clone(), p));
                    }
                }
                ImportLocation::Env(name) => {
                    if !envs.iter().any(|(l, _)| l == &canonical) {
                        envs.push((canonical.clone(), name.clone()));
                    }
                }
                ImportLocation::Remote(url) => {
                    let batch = match url.scheme {
                        Scheme::HTTP => &mut https,
                        Scheme::HTTPS => &mut httpss,
                    };
                    if !batch.iter().any(|(l, _)| l == &canonical) {
                        let request =
                            self.build_request(url, chain).await?;
                        batch.push((canonical.clone(), request));
                    }
                }
                ImportLocation::Missing => {}
            }
        }

        let origin = parent_origin(chain);
        let mut out = HashMap::new();

        if !paths.is_empty() {
            let budget = self.remaining_budget()?;
            trace!(count = paths.len(), "batched path reads");
            let inputs: Vec<_> =
                paths.iter().map(|(_, p)| p.clone()).collect();
            let results = self.fetcher.read_path(&inputs, budget).await;
            for ((loc, _), r) in paths.into_iter().zip(results) {
                out.insert(loc, r);
            }
        }
        if !envs.is_empty() {
            let budget = self.remaining_budget()?;
            trace!(count = envs.len(), "batched environment reads");
            let inputs: Vec<_> =
                envs.iter().map(|(_, v)| v.clone()).collect();
            let results = self.fetcher.read_env(&inputs, budget).await;
            for ((loc, _), r) in envs.into_iter().zip(results) {
                out.insert(loc, r.map(String::into_bytes));
            }
        }
        if !https.is_empty() {
            let budget = self.remaining_budget()?;
            trace!(count = https.len(), "batched http reads");
            let inputs: Vec<_> =
                https.iter().map(|(_, r)| r.clone()).collect();
            let results =
                self.fetcher.read_http(&inputs, &origin, budget).await;
            for ((loc, _), r) in https.into_iter().zip(results) {
                out.insert(loc, r);
            }
        }
        if !httpss.is_empty() {
            let budget = self.remaining_budget()?;
            trace!(count = httpss.len(), "batched https reads");
            let inputs: Vec<_> =
                httpss.iter().map(|(_, r)| r.clone()).collect();
            let results =
                self.fetcher.read_https(&inputs, &origin, budget).await;
            for ((loc, _), r) in httpss.into_iter().zip(results) {
                out.insert(loc, r);
            }
        }
        Ok(out)
    }

    async fn resolve_import(
        &self,
        import: &Import,
        chain: &[ImportLocation],
        prefetched: &HashMap<ImportLocation, FetchOutcome<Vec<u8>>>,
    ) -> Result<SubExpr, Error> {
        let parent = chain.last().expect("the parent chain is never empty");
        let canonical = canonicalize(parent, &import.location)?;

        if import.mode == ImportMode::Location {
            return Ok(location_value(&canonical));
        }

        let key = cache_key(&import.hash, &canonical);
        if let Some(hit) = self.cached(&key) {
            debug!(import = %canonical, "cache hit");
            return Ok(hit);
        }
        if let (Some(Hash::SHA256(digest)), Some(_)) =
            (&import.hash, &self.disk_cache)
        {
            if let Some(e) = self.read_disk_cache(digest) {
                debug!(import = %canonical, "disk cache hit");
                self.cache.lock().unwrap().insert(key, e.clone());
                return Ok(e);
            }
        }

        if chain.contains(&canonical) {
            return Err(ImportError::Loop(canonical).into());
        }
        if let Some(limit) = self.depth_limit {
            if chain.len() + 1 > limit {
                return Err(ImportError::DepthExceeded { limit }.into());
            }
        }

        debug!(import = %canonical, mode = ?import.mode, "resolving");
        let bytes = self.fetch(&canonical, chain, prefetched).await?;

        let parsed = match import.mode {
            ImportMode::RawText => {
                let text = String::from_utf8(bytes).map_err(|_| {
                    ImportError::InvalidEncoding(canonical.clone())
                })?;
                rc(Expr::TextLit(text.into()))
            }
            ImportMode::Code => {
                if binary::is_binary(&bytes) {
                    binary::decode(&bytes)?
                } else {
                    let source =
                        String::from_utf8(bytes).map_err(|_| {
                            ImportError::InvalidEncoding(canonical.clone())
                        })?;
                    self.parser.parse(&source)?
                }
            }
            ImportMode::Location => unreachable!(),
        };

        // Imports of the import resolve against its own location
        let mut child_chain = chain.to_vec();
        child_chain.push(canonical.clone());
        let resolved = self.resolve_inner(&parsed, &child_chain).await?;

        type_of(&resolved)?;
        let normal = normalize(&resolved);
        let alpha = alpha_normalize(&normal);

        if let Some(Hash::SHA256(declared)) = &import.hash {
            let actual = Sha256::digest(&binary::encode(&alpha));
            if actual.as_slice() != declared.as_slice() {
                return Err(ImportError::IntegrityFailure {
                    expected: format!("sha256:{}", hex::encode(declared)),
                    actual: format!("sha256:{}", hex::encode(actual)),
                }
                .into());
            }
            trace!(import = %canonical, "integrity verified");
            self.write_disk_cache(declared, &alpha);
        }

        self.cache.lock().unwrap().insert(key, normal.clone());
        Ok(normal)
    }

    async fn fetch(
        &self,
        canonical: &ImportLocation,
        chain: &[ImportLocation],
        prefetched: &HashMap<ImportLocation, FetchOutcome<Vec<u8>>>,
    ) -> Result<Vec<u8>, Error> {
        let fetch_failed = |f: FetchFailure| {
            Error::Resolve(ImportError::FetchFailed {
                location: canonical.clone(),
                status: f.status,
                cause: f.cause,
            })
        };

        if let Some(outcome) = prefetched.get(canonical) {
            return outcome.clone().map_err(fetch_failed);
        }

        match canonical {
            ImportLocation::Missing => Err(ImportError::Missing.into()),
            ImportLocation::Local(_, _) if is_ipfs(canonical) => {
                self.fetch_ipfs(canonical, chain).await
            }
            ImportLocation::Local(_, _) => {
                let budget = self.remaining_budget()?;
                let path = PathBuf::from(canonical.to_string());
                let mut results =
                    self.fetcher.read_path(&[path], budget).await;
                single(results.pop()).map_err(fetch_failed)
            }
            ImportLocation::Env(name) => {
                let budget = self.remaining_budget()?;
                let mut results =
                    self.fetcher.read_env(&[name.clone()], budget).await;
                single(results.pop())
                    .map(String::into_bytes)
                    .map_err(fetch_failed)
            }
            ImportLocation::Remote(url) => {
                let request = self.build_request(url, chain).await?;
                let budget = self.remaining_budget()?;
                let origin = parent_origin(chain);
                let mut results = match url.scheme {
                    Scheme::HTTP => {
                        self.fetcher
                            .read_http(&[request], &origin, budget)
                            .await
                    }
                    Scheme::HTTPS => {
                        self.fetcher
                            .read_https(&[request], &origin, budget)
                            .await
                    }
                };
                single(results.pop()).map_err(fetch_failed)
            }
        }
    }

    /// `/ipfs/...` paths try the local daemon mount, then the local
    /// gateway, then the configured public gateway.
    async fn fetch_ipfs(
        &self,
        canonical: &ImportLocation,
        chain: &[ImportLocation],
    ) -> Result<Vec<u8>, Error> {
        let components = match canonical {
            ImportLocation::Local(_, components) => components,
            _ => unreachable!(),
        };
        let origin = parent_origin(chain);

        let budget = self.remaining_budget()?;
        let path = PathBuf::from(canonical.to_string());
        let mut results = self.fetcher.read_path(&[path], budget).await;
        if let Ok(bytes) = single(results.pop()) {
            return Ok(bytes);
        }

        let budget = self.remaining_budget()?;
        let local_gateway = HttpRequest {
            url: format!(
                "http://localhost:8000/{}",
                components.join("/")
            ),
            headers: vec![],
        };
        let mut results = self
            .fetcher
            .read_http(&[local_gateway], &origin, budget)
            .await;
        if let Ok(bytes) = single(results.pop()) {
            return Ok(bytes);
        }

        let budget = self.remaining_budget()?;
        let public_gateway = HttpRequest {
            url: format!(
                "https://{}/{}",
                self.ipfs_gateway,
                components.join("/")
            ),
            headers: vec![],
        };
        let mut results = self
            .fetcher
            .read_https(&[public_gateway], &origin, budget)
            .await;
        single(results.pop()).map_err(|f| {
            Error::Resolve(ImportError::FetchFailed {
                location: canonical.clone(),
                status: f.status,
                cause: f.cause,
            })
        })
    }

    /// Resolve and check a remote import's headers expression, producing
    /// the request handed to the fetch capability.
    async fn build_request(
        &self,
        url: &URL,
        chain: &[ImportLocation],
    ) -> Result<HttpRequest, Error> {
        let headers = match &url.headers {
            None => vec![],
            Some(h) => {
                let resolved = self.resolve_inner(h, chain).await?;
                let annotated = rc(Expr::Annot(resolved, headers_type()));
                type_of(&annotated)?;
                headers_from_normal(&normalize(&annotated))
            }
        };
        Ok(HttpRequest {
            url: url_string(url),
            headers,
        })
    }

    fn cached(&self, key: &str) -> Option<SubExpr> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    fn read_disk_cache(&self, digest: &[u8]) -> Option<SubExpr> {
        let dir = self.disk_cache.as_ref()?;
        let path = dir.join(format!("1220{}", hex::encode(digest)));
        let bytes = std::fs::read(&path).ok()?;
        // A corrupt entry is ignored, not fatal
        if Sha256::digest(&bytes).as_slice() != digest {
            warn!(path = %path.display(), "corrupt cache entry ignored");
            return None;
        }
        match binary::decode(&bytes) {
            Ok(e) => Some(e),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "undecodable cache entry ignored");
                None
            }
        }
    }

    fn write_disk_cache(&self, digest: &[u8], alpha: &SubExpr) {
        let dir = match &self.disk_cache {
            Some(dir) => dir,
            None => return,
        };
        let path = dir.join(format!("1220{}", hex::encode(digest)));
        if path.exists() {
            return;
        }
        if let Err(e) = std::fs::write(&path, binary::encode(alpha)) {
            warn!(path = %path.display(), error = %e, "cache write failed");
        }
    }

    /// The time left before the deadline; expiry surfaces as `Timeout`.
    fn remaining_budget(&self) -> Result<Option<Duration>, ImportError> {
        match self.deadline {
            None => Ok(None),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    Err(ImportError::Timeout)
                } else {
                    Ok(Some(deadline - now))
                }
            }
        }
    }
}

fn single<T>(outcome: Option<FetchOutcome<T>>) -> FetchOutcome<T> {
    outcome.unwrap_or_else(|| {
        Err(FetchFailure {
            status: None,
            cause: "the fetch capability returned no outcome".to_owned(),
        })
    })
}

fn cache_key(hash: &Option<Hash>, canonical: &ImportLocation) -> String {
    match hash {
        Some(h) => h.to_hash_string(),
        None => canonical.to_string(),
    }
}

fn is_ipfs(location: &ImportLocation) -> bool {
    match location {
        ImportLocation::Local(FilePrefix::Absolute, components) => {
            matches!(
                components.first().map(String::as_str),
                Some("ipfs") | Some("ipns")
            )
        }
        _ => false,
    }
}

fn parent_origin(chain: &[ImportLocation]) -> String {
    match chain.last() {
        Some(ImportLocation::Remote(url)) => url.authority.clone(),
        _ => "localhost".to_owned(),
    }
}

pub(crate) fn url_string(url: &URL) -> String {
    let scheme = match url.scheme {
        Scheme::HTTP => "http",
        Scheme::HTTPS => "https",
    };
    let mut out =
        format!("{}://{}/{}", scheme, url.authority, url.path.join("/"));
    if let Some(q) = &url.query {
        out.push('?');
        out.push_str(q);
    }
    out
}

/// Find every import that must be resolved at this step. Both sides of a
/// `?` are left for the fallback logic; an import's headers resolve when
/// the import itself does.
fn collect_unresolved(
    expr: &SubExpr,
    imports: &mut Vec<Import>,
    alts: &mut Vec<SubExpr>,
) {
    match expr.as_ref() {
        Expr::Import(i) => imports.push(i.clone()),
        Expr::BinOp(BinOp::ImportAlt, _, _) => alts.push(expr.clone()),
        e => {
            let imports = RefCell::new(imports);
            let alts = RefCell::new(alts);
            e.foreach_subexpr_with_binders(
                &mut |s| {
                    collect_unresolved(s, &mut **imports.borrow_mut(), &mut **alts.borrow_mut())
                },
                &mut |_, s| {
                    collect_unresolved(s, &mut **imports.borrow_mut(), &mut **alts.borrow_mut())
                },
            )
        }
    }
}

fn replace_resolved(
    expr: &SubExpr,
    imports: &HashMap<Import, SubExpr>,
    alts: &[(SubExpr, SubExpr)],
) -> SubExpr {
    match expr.as_ref() {
        Expr::Import(i) => match imports.get(i) {
            Some(e) => e.clone(),
            None => expr.clone(),
        },
        Expr::BinOp(BinOp::ImportAlt, _, _) => {
            match alts.iter().find(|(k, _)| k == expr) {
                Some((_, e)) => e.clone(),
                None => expr.clone(),
            }
        }
        e => rc(e.map_subexprs_with_binders(
            |s| replace_resolved(s, imports, alts),
            |_, s| replace_resolved(s, imports, alts),
        )),
    }
}

/// Chain an import location onto the location of its parent and put the
/// result in canonical form. This is where the referential-transparency
/// rule is enforced.
fn canonicalize(
    parent: &ImportLocation,
    location: &ImportLocation,
) -> Result<ImportLocation, ImportError> {
    use ImportLocation::*;
    Ok(match location {
        Missing => Missing,
        Env(name) => match parent {
            Remote(_) => return Err(ImportError::Banned(location.clone())),
            _ => Env(name.clone()),
        },
        Remote(url) => Remote(URL {
            path: canonicalize_segments(
                url.path.iter().cloned(),
                false,
            ),
            ..url.clone()
        }),
        Local(prefix, components) => match (parent, prefix) {
            // Relative paths chain onto a remote parent as URL paths
            (Remote(purl), FilePrefix::Here)
            | (Remote(purl), FilePrefix::Parent) => {
                let mut segments: Vec<String> = purl
                    .path
                    .iter()
                    .take(purl.path.len().saturating_sub(1))
                    .cloned()
                    .collect();
                if *prefix == FilePrefix::Parent {
                    segments.push("..".to_owned());
                }
                segments.extend(components.iter().cloned());
                Remote(URL {
                    path: canonicalize_segments(
                        segments.into_iter(),
                        false,
                    ),
                    query: None,
                    headers: purl.headers.clone(),
                    ..purl.clone()
                })
            }
            (Remote(_), _) => {
                return Err(ImportError::RemoteImportsLocal {
                    parent: parent.clone(),
                    child: location.clone(),
                })
            }
            (Local(pprefix, pcomponents), FilePrefix::Here)
            | (Local(pprefix, pcomponents), FilePrefix::Parent) => {
                let mut segments: Vec<String> = pcomponents
                    .iter()
                    .take(pcomponents.len().saturating_sub(1))
                    .cloned()
                    .collect();
                if *prefix == FilePrefix::Parent {
                    segments.push("..".to_owned());
                }
                segments.extend(components.iter().cloned());
                Local(
                    *pprefix,
                    canonicalize_segments(
                        segments.into_iter(),
                        *pprefix != FilePrefix::Absolute,
                    ),
                )
            }
            _ => Local(
                *prefix,
                canonicalize_segments(
                    components.iter().cloned(),
                    *prefix != FilePrefix::Absolute,
                ),
            ),
        },
    })
}

/// Resolve `.` and `..` segments. Leading `..`s are kept when the path
/// is relative and dropped when it is rooted.
fn canonicalize_segments(
    segments: impl Iterator<Item = String>,
    keep_leading_parent: bool,
) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for segment in segments {
        match segment.as_str() {
            "." => {}
            ".." => match out.last().map(String::as_str) {
                None | Some("..") => {
                    if keep_leading_parent {
                        out.push(segment);
                    }
                }
                Some(_) => {
                    out.pop();
                }
            },
            _ => out.push(segment),
        }
    }
    out
}

/// The type every headers expression must have.
fn headers_type() -> SubExpr {
    let mut kts = BTreeMap::new();
    kts.insert(
        Label::from("mapKey"),
        Expr::from_builtin(Builtin::Text),
    );
    kts.insert(
        Label::from("mapValue"),
        Expr::from_builtin(Builtin::Text),
    );
    rc(Expr::App(
        Expr::from_builtin(Builtin::List),
        rc(Expr::RecordType(kts)),
    ))
}

/// Read the `(key, value)` pairs out of a normalized, well-typed headers
/// expression.
fn headers_from_normal(e: &SubExpr) -> Vec<(String, String)> {
    let entries = match e.as_ref() {
        Expr::NEListLit(xs) => xs.as_slice(),
        _ => return vec![],
    };
    let mut out = Vec::new();
    for entry in entries {
        if let Expr::RecordLit(kvs) = entry.as_ref() {
            let field = |name: &str| {
                kvs.get(&Label::from(name)).and_then(|v| {
                    match v.as_ref() {
                        Expr::TextLit(t) => {
                            t.as_plain_text().map(str::to_owned)
                        }
                        _ => None,
                    }
                })
            };
            if let (Some(k), Some(v)) = (field("mapKey"), field("mapValue"))
            {
                out.push((k, v));
            }
        }
    }
    out
}

/// The value of an `as Location` import:
/// `< Local : Text | Remote : Text | Environment : Text | Missing >`.
fn location_value(canonical: &ImportLocation) -> SubExpr {
    let text = Expr::from_builtin(Builtin::Text);
    let mut alts: BTreeMap<Label, Option<SubExpr>> = BTreeMap::new();
    alts.insert("Local".into(), Some(text.clone()));
    alts.insert("Remote".into(), Some(text.clone()));
    alts.insert("Environment".into(), Some(text));
    alts.insert("Missing".into(), None);

    let (tag, payload): (Label, Option<SubExpr>) = match canonical {
        ImportLocation::Local(_, _) => (
            "Local".into(),
            Some(rc(Expr::TextLit(canonical.to_string().into()))),
        ),
        ImportLocation::Remote(url) => (
            "Remote".into(),
            Some(rc(Expr::TextLit(url_string(url).into()))),
        ),
        ImportLocation::Env(name) => (
            "Environment".into(),
            Some(rc(Expr::TextLit(name.as_str().into()))),
        ),
        ImportLocation::Missing => ("Missing".into(), None),
    };
    alts.remove(&tag);
    rc(Expr::UnionLit(tag, payload, alts))
}
