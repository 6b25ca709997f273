//! Process-wide cache of compiled stylesheets.
//!
//! The outer map is only locked long enough to find or create a key's slot.
//! Compilation happens while holding the slot's own lock, so concurrent
//! callers for the same key wait for the first compile and share its result,
//! while callers for other keys proceed independently. A slot whose compile
//! failed is dropped again unless another caller is already waiting on it.

use log::{debug, info};
use metadoc_resource::FilesystemImportResolver;
use metadoc_template_core::{
    CompiledStylesheet, ImportPolicy, StylesheetCompiler, StylesheetLocator, TemplateError,
};
use metadoc_xslt::XsltCompiler;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

type CacheKey = (StylesheetLocator, ImportPolicy);
type Compiled = Option<Arc<dyn CompiledStylesheet>>;

/// One key's compiled program. `ready` is set once `compiled` holds a value.
#[derive(Default)]
struct CacheSlot {
    compiled: Mutex<Compiled>,
    ready: AtomicBool,
}

type Slot = Arc<CacheSlot>;

pub struct StylesheetCache {
    compiler: Arc<dyn StylesheetCompiler>,
    slots: Mutex<HashMap<CacheKey, Slot>>,
    compilations: AtomicUsize,
}

impl Default for StylesheetCache {
    fn default() -> Self {
        Self::new(Arc::new(XsltCompiler::new()))
    }
}

impl fmt::Debug for StylesheetCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StylesheetCache")
            .field("compiler", &self.compiler.name())
            .field("entries", &self.len())
            .field("compilations", &self.compilations())
            .finish()
    }
}

impl StylesheetCache {
    pub fn new(compiler: Arc<dyn StylesheetCompiler>) -> Self {
        Self {
            compiler,
            slots: Mutex::new(HashMap::new()),
            compilations: AtomicUsize::new(0),
        }
    }

    /// Returns the compiled stylesheet for `(locator, policy)`, compiling it
    /// on first use. Failures are returned to the caller and not remembered,
    /// so a later call retries.
    pub fn get_or_compile(
        &self,
        locator: &StylesheetLocator,
        policy: &ImportPolicy,
    ) -> Result<Arc<dyn CompiledStylesheet>, TemplateError> {
        let slot = self.slot(locator, policy)?;
        let mut compiled = lock(&slot, locator)?;
        if let Some(stylesheet) = compiled.as_ref() {
            debug!("Stylesheet cache hit for '{}'", locator);
            return Ok(Arc::clone(stylesheet));
        }

        match self.compile(locator, policy) {
            Ok(stylesheet) => {
                *compiled = Some(Arc::clone(&stylesheet));
                slot.ready.store(true, Ordering::SeqCst);
                Ok(stylesheet)
            }
            Err(err) => {
                self.evict_failed(locator, policy, &slot);
                Err(err)
            }
        }
    }

    /// Compiles `(locator, policy)` again and replaces any cached program.
    pub fn reload(
        &self,
        locator: &StylesheetLocator,
        policy: &ImportPolicy,
    ) -> Result<Arc<dyn CompiledStylesheet>, TemplateError> {
        let slot = self.slot(locator, policy)?;
        let mut compiled = lock(&slot, locator)?;
        let stylesheet = match self.compile(locator, policy) {
            Ok(stylesheet) => stylesheet,
            Err(err) => {
                if compiled.is_none() {
                    self.evict_failed(locator, policy, &slot);
                }
                return Err(err);
            }
        };
        *compiled = Some(Arc::clone(&stylesheet));
        slot.ready.store(true, Ordering::SeqCst);
        info!("Reloaded stylesheet '{}'", locator);
        Ok(stylesheet)
    }

    /// Drops every cached program. Callers holding an `Arc` keep theirs.
    pub fn clear(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.clear();
        }
    }

    /// Number of keys with a compiled program. Compiles still in flight
    /// are not counted.
    pub fn len(&self) -> usize {
        let Ok(slots) = self.slots.lock() else {
            return 0;
        };
        slots
            .values()
            .filter(|slot| slot.ready.load(Ordering::SeqCst))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many compilations this cache has started.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    fn slot(&self, locator: &StylesheetLocator, policy: &ImportPolicy) -> Result<Slot, TemplateError> {
        let mut slots = self.slots.lock().map_err(|_| poisoned(locator))?;
        let slot = slots.entry((locator.clone(), policy.clone())).or_default();
        Ok(Arc::clone(slot))
    }

    /// Removes an empty slot after a failed compile. Callers already waiting
    /// on the slot hold their own reference and will retry through it, so
    /// the slot stays while any of them remain.
    fn evict_failed(&self, locator: &StylesheetLocator, policy: &ImportPolicy, slot: &Slot) {
        let Ok(mut slots) = self.slots.lock() else {
            return;
        };
        let key = (locator.clone(), policy.clone());
        let ours = slots.get(&key).is_some_and(|current| Arc::ptr_eq(current, slot));
        // One reference in the map, one held by the failing caller.
        if ours && Arc::strong_count(slot) <= 2 {
            slots.remove(&key);
        }
    }

    fn compile(
        &self,
        locator: &StylesheetLocator,
        policy: &ImportPolicy,
    ) -> Result<Arc<dyn CompiledStylesheet>, TemplateError> {
        self.compilations.fetch_add(1, Ordering::SeqCst);
        let start = Instant::now();
        let source = locator.read_source()?;
        let imports = FilesystemImportResolver::from_policy(policy);
        let stylesheet = self.compiler.compile(&source, locator, &imports)?;
        debug!(
            "Compiled stylesheet '{}' with {} in {:?}",
            locator,
            self.compiler.name(),
            start.elapsed()
        );
        Ok(stylesheet)
    }
}

fn lock<'a>(
    slot: &'a Slot,
    locator: &StylesheetLocator,
) -> Result<MutexGuard<'a, Compiled>, TemplateError> {
    slot.compiled.lock().map_err(|_| poisoned(locator))
}

fn poisoned(locator: &StylesheetLocator) -> TemplateError {
    TemplateError::StylesheetLoad {
        locator: locator.to_string(),
        message: "stylesheet cache lock poisoned".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadoc_template_core::{
        ExtensionNamespaceBinding, ImportResolver, MetadataDocument, TransformResult,
    };
    use std::sync::{Barrier, mpsc};
    use std::thread;
    use std::time::Duration;

    const SHEET: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
        <xsl:output omit-xml-declaration="yes"/>
        <xsl:template match="/"><p><xsl:value-of select="/r"/></p></xsl:template>
    </xsl:stylesheet>"#;

    #[derive(Debug)]
    struct Echo(StylesheetLocator);

    impl CompiledStylesheet for Echo {
        fn execute(
            &self,
            document: &MetadataDocument,
            _binding: &ExtensionNamespaceBinding,
        ) -> Result<TransformResult, TemplateError> {
            Ok(TransformResult::new(document.xml()))
        }

        fn locator(&self) -> &StylesheetLocator {
            &self.0
        }
    }

    /// Slow compiler that widens the window for racing callers.
    struct SlowCompiler;

    impl StylesheetCompiler for SlowCompiler {
        fn compile(
            &self,
            _source: &str,
            locator: &StylesheetLocator,
            _imports: &dyn ImportResolver,
        ) -> Result<Arc<dyn CompiledStylesheet>, TemplateError> {
            thread::sleep(Duration::from_millis(50));
            Ok(Arc::new(Echo(locator.clone())))
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[test]
    fn test_second_lookup_is_a_hit() {
        let cache = StylesheetCache::default();
        let locator = StylesheetLocator::inline("s", SHEET);
        let policy = ImportPolicy::default();

        let a = cache.get_or_compile(&locator, &policy).unwrap();
        let b = cache.get_or_compile(&locator, &policy).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.compilations(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_policy_is_part_of_the_key() {
        let cache = StylesheetCache::default();
        let locator = StylesheetLocator::inline("s", SHEET);
        cache.get_or_compile(&locator, &ImportPolicy::default()).unwrap();
        cache
            .get_or_compile(&locator, &ImportPolicy::with_fallback_base("/tmp"))
            .unwrap();
        assert_eq!(cache.compilations(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_callers_compile_once() {
        let cache = Arc::new(StylesheetCache::new(Arc::new(SlowCompiler)));
        let locator = StylesheetLocator::inline("shared", SHEET);
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let locator = locator.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_or_compile(&locator, &ImportPolicy::default()).unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(cache.compilations(), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_failures_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.xsl");
        let locator = StylesheetLocator::path(&path);
        let cache = StylesheetCache::default();

        let err = cache.get_or_compile(&locator, &ImportPolicy::default()).unwrap_err();
        assert!(matches!(err, TemplateError::StylesheetLoad { .. }));
        assert!(cache.is_empty());

        std::fs::write(&path, SHEET).unwrap();
        cache.get_or_compile(&locator, &ImportPolicy::default()).unwrap();
        assert_eq!(cache.compilations(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_reload_replaces_and_clear_empties() {
        let cache = StylesheetCache::default();
        let locator = StylesheetLocator::inline("s", SHEET);
        let policy = ImportPolicy::default();

        let first = cache.get_or_compile(&locator, &policy).unwrap();
        let reloaded = cache.reload(&locator, &policy).unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));
        let after = cache.get_or_compile(&locator, &policy).unwrap();
        assert!(Arc::ptr_eq(&reloaded, &after));
        assert_eq!(cache.compilations(), 2);

        cache.clear();
        assert!(cache.is_empty());
        cache.get_or_compile(&locator, &policy).unwrap();
        assert_eq!(cache.compilations(), 3);
    }

    #[test]
    fn test_failed_locators_leave_no_slots() {
        let cache = StylesheetCache::default();
        for name in ["a.xsl", "b.xsl", "c.xsl"] {
            let locator = StylesheetLocator::path(format!("/no/such/dir/{}", name));
            assert!(cache.get_or_compile(&locator, &ImportPolicy::default()).is_err());
            assert!(cache.reload(&locator, &ImportPolicy::default()).is_err());
        }
        assert_eq!(cache.slots.lock().unwrap().len(), 0);
        assert_eq!(cache.compilations(), 6);
    }

    /// Blocks inside `compile` until the test lets it finish.
    struct GatedCompiler {
        started: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl StylesheetCompiler for GatedCompiler {
        fn compile(
            &self,
            _source: &str,
            locator: &StylesheetLocator,
            _imports: &dyn ImportResolver,
        ) -> Result<Arc<dyn CompiledStylesheet>, TemplateError> {
            self.started.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            Ok(Arc::new(Echo(locator.clone())))
        }

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    #[test]
    fn test_in_flight_compile_is_not_counted() {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let cache = Arc::new(StylesheetCache::new(Arc::new(GatedCompiler {
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        })));

        let worker = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache
                    .get_or_compile(&StylesheetLocator::inline("gated", SHEET), &ImportPolicy::default())
                    .unwrap()
            })
        };
        started_rx.recv().unwrap();
        assert_eq!(cache.len(), 0);

        release_tx.send(()).unwrap();
        worker.join().unwrap();
        assert_eq!(cache.len(), 1);
    }
}
