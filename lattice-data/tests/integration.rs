//! Integration Tests for Data Resources
//!
//! These tests drive factories, resources, the server collector and the
//! client global cache together through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::watch;

use lattice_data::{
    DataExtractor, Environment, ExtractorOptions, FactoryOptions, Fetch, FetchError, Globals,
    Read, Resource, ResourceFactory, ResourceHook, Status, Suspension, DEFAULT_CACHE_VAR,
};

/// Counts fetches and aborts for one fetch function.
#[derive(Default)]
struct Spy {
    fetches: AtomicUsize,
    aborts: AtomicUsize,
}

impl Spy {
    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

/// Holds every gated fetch until opened.
struct Gate(watch::Sender<bool>);

impl Gate {
    fn new() -> Arc<Self> {
        Arc::new(Self(watch::channel(false).0))
    }

    fn open(&self) {
        self.0.send_replace(true);
    }

    async fn wait(&self) {
        let mut rx = self.0.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

/// A fetch that resolves to `{"msg": "Loaded <req>"}` once `gate` opens.
fn gated_fetch(
    spy: Arc<Spy>,
    gate: Arc<Gate>,
) -> impl Fn(&u32) -> Fetch<Value> + Send + Sync + 'static {
    move |req: &u32| {
        spy.fetches.fetch_add(1, Ordering::SeqCst);
        let gate = gate.clone();
        let req = *req;
        let spy = spy.clone();
        Fetch::new(async move {
            gate.wait().await;
            Ok(json!({ "msg": format!("Loaded {}", req) }))
        })
        .with_abort(move || {
            spy.aborts.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// A fetch that resolves immediately.
fn instant_fetch(spy: Arc<Spy>) -> impl Fn(&u32) -> Fetch<Value> + Send + Sync + 'static {
    move |req: &u32| {
        spy.fetches.fetch_add(1, Ordering::SeqCst);
        Fetch::ready(json!({ "msg": format!("Loaded {}", req) }))
    }
}

async fn wait_ready<T: Clone + Send + Sync + 'static>(resource: &Resource<T>) -> T {
    loop {
        match resource.read().unwrap() {
            Read::Ready(value) => return value,
            Read::Failed(err) => panic!("fetch failed: {}", err),
            Read::Pending(suspend) => {
                tokio::time::timeout(Duration::from_secs(1), suspend)
                    .await
                    .expect("resource should settle");
            }
        }
    }
}

/// Identical keys share one fetch; only the last disposal aborts it.
#[tokio::test]
async fn shared_fetch_is_aborted_once_by_last_consumer() {
    let spy = Arc::new(Spy::default());
    let gate = Gate::new();
    let factory = ResourceFactory::new(
        gated_fetch(spy.clone(), gate),
        FactoryOptions::new().serialize(true),
    )
    .unwrap();

    let resources: Vec<_> = (0..3).map(|_| factory.create(1).unwrap()).collect();
    assert_eq!(spy.fetches(), 1);

    resources[0].dispose();
    resources[1].dispose();
    assert_eq!(spy.aborts(), 0);
    assert_eq!(resources[2].status(), Status::Loading);

    resources[2].dispose();
    resources[2].dispose();
    assert_eq!(spy.aborts(), 1);
    assert!(!factory.has_cache_entry(&1).unwrap());
}

/// Repeated pending reads hand out the same placeholder, and the value is
/// stable after settlement.
#[tokio::test]
async fn placeholder_is_stable_until_settled() {
    let gate = Gate::new();
    let factory = ResourceFactory::new(
        gated_fetch(Arc::new(Spy::default()), gate.clone()),
        FactoryOptions::new(),
    )
    .unwrap();

    let resource = factory.create(1).unwrap();
    let Read::Pending(first) = resource.read().unwrap() else {
        panic!("expected pending");
    };
    let Read::Pending(second) = resource.read().unwrap() else {
        panic!("expected pending");
    };
    assert!(first.ptr_eq(&second));

    gate.open();
    assert_eq!(wait_ready(&resource).await, json!({ "msg": "Loaded 1" }));
    assert!(first.is_released());
    assert_eq!(
        resource.read().unwrap().ready(),
        Some(json!({ "msg": "Loaded 1" }))
    );
}

/// Every read after settlement returns the very value the fetch produced.
#[test]
fn settled_value_keeps_identity() {
    let produced: Arc<str> = Arc::from("payload");
    let produced_clone = produced.clone();
    let factory = ResourceFactory::new(
        move |_: &u32| Fetch::ready(produced_clone.clone()),
        FactoryOptions::new(),
    )
    .unwrap();

    let resource = factory.create(1).unwrap();
    for _ in 0..2 {
        let value = resource.read().unwrap().ready().unwrap();
        assert!(Arc::ptr_eq(&value, &produced));
    }
}

/// A placeholder taken before disposal never resolves.
#[tokio::test]
async fn disposed_placeholder_never_resolves() {
    let spy = Arc::new(Spy::default());
    let gate = Gate::new();
    let factory =
        ResourceFactory::new(gated_fetch(spy.clone(), gate.clone()), FactoryOptions::new())
            .unwrap();

    let resource = factory.create(1).unwrap();
    let Read::Pending(suspend) = resource.read().unwrap() else {
        panic!("expected pending");
    };
    resource.dispose();
    gate.open();

    let waited = tokio::time::timeout(Duration::from_millis(50), suspend).await;
    assert!(waited.is_err());
    assert_eq!(resource.status(), Status::Aborted);
    assert_eq!(spy.aborts(), 1);
}

#[test]
fn child_projection_of_loaded_and_errored_parents() {
    let factory = ResourceFactory::new(
        |_: &u32| Fetch::ready(json!({ "a": "x" })),
        FactoryOptions::new(),
    )
    .unwrap();
    let loaded = factory.create(1).unwrap();
    let child = loaded.field("a").unwrap();
    assert_eq!(child.read().unwrap().ready(), Some(json!("x")));

    let err = FetchError::msg("boom");
    let err_clone = err.clone();
    let failing = ResourceFactory::new(
        move |_: &u32| Fetch::<Value>::failed(err_clone.clone()),
        FactoryOptions::new(),
    )
    .unwrap();
    let errored = failing.create(1).unwrap();
    let child = errored.field("a").unwrap();
    match child.read().unwrap().into_result() {
        Err(Suspension::Failed(e)) => assert!(e.ptr_eq(&err)),
        other => panic!("unexpected {:?}", other),
    }
}

/// Disposing one of two children leaves the fetch running.
#[tokio::test]
async fn child_disposal_cascades_only_when_last() {
    let spy = Arc::new(Spy::default());
    let gate = Gate::new();
    let factory =
        ResourceFactory::new(gated_fetch(spy.clone(), gate.clone()), FactoryOptions::new())
            .unwrap();

    let parent = factory.create(1).unwrap();
    let msg = parent.field("msg").unwrap();
    let other = parent.field("other").unwrap();
    assert_eq!(parent.live_children(), 2);

    other.dispose();
    assert_eq!(parent.live_children(), 1);
    assert_eq!(spy.aborts(), 0);

    gate.open();
    assert_eq!(wait_ready(&msg).await, json!("Loaded 1"));
    assert_eq!(other.status(), Status::Aborted);

    msg.dispose();
    assert!(parent.is_disposed());
    assert_eq!(spy.aborts(), 0, "a settled fetch has nothing to abort");
}

/// Hydration resolves from the installed slot without fetching and drains it.
#[test]
fn hydrates_from_global_cache() {
    let spy = Arc::new(Spy::default());
    let globals = Globals::new();
    globals
        .install_json(
            DEFAULT_CACHE_VAR,
            json!({ "res": { "1": { "msg": "Loaded 1" } } }),
        )
        .unwrap();

    let factory = ResourceFactory::new(
        instant_fetch(spy.clone()),
        FactoryOptions::new().id("res").globals(globals.clone()),
    )
    .unwrap();

    let mut hook = ResourceHook::new();
    let resource = factory.use_resource(&mut hook, 1).unwrap();
    assert_eq!(
        resource.read().unwrap().ready(),
        Some(json!({ "msg": "Loaded 1" }))
    );
    assert_eq!(spy.fetches(), 0);

    let data = globals.data(DEFAULT_CACHE_VAR).unwrap();
    assert!(!data.contains_key("res"));

    // One-shot: once the master is gone the next request fetches.
    hook.commit();
    hook.unmount();
    let fresh = factory.create(1).unwrap();
    assert!(fresh.is_loaded());
    assert_eq!(spy.fetches(), 1);
}

/// `no_ssr` skips the fetch during the render pass and fetches on commit.
#[test]
fn no_ssr_fetches_only_after_mount() {
    let spy = Arc::new(Spy::default());
    let server = ResourceFactory::new(
        instant_fetch(spy.clone()),
        FactoryOptions::new()
            .id("res")
            .no_ssr(true)
            .environment(Environment::Server),
    )
    .unwrap();

    let extractor = DataExtractor::new(ExtractorOptions::new()).unwrap();
    let ctx = extractor.collect_data();
    let rendered = {
        let _scope = ctx.enter();
        let mut hook = ResourceHook::new();
        server.use_resource(&mut hook, 1).unwrap()
    };
    assert!(matches!(ctx.render(&rendered).unwrap(), Read::Pending(_)));
    assert_eq!(spy.fetches(), 0);
    assert!(extractor.data().is_empty());

    let client = ResourceFactory::new(
        instant_fetch(spy.clone()),
        FactoryOptions::new().id("res").no_ssr(true),
    )
    .unwrap();
    let mut hook = ResourceHook::new();
    let resource = client.use_resource(&mut hook, 1).unwrap();
    assert_eq!(spy.fetches(), 0);

    hook.commit();
    assert_eq!(spy.fetches(), 1);
    assert!(resource.is_loaded());
}

/// Server snapshot installed on the client reproduces the rendered values
/// without refetching.
#[tokio::test]
async fn snapshot_round_trip() {
    let server_spy = Arc::new(Spy::default());
    let server = ResourceFactory::new(
        instant_fetch(server_spy.clone()),
        FactoryOptions::new().id("res").environment(Environment::Server),
    )
    .unwrap();

    let extractor = DataExtractor::new(ExtractorOptions::new()).unwrap();
    let ctx = extractor.collect_data();
    for req in [1, 2, 1] {
        let resource = server.create_in(&ctx, req).unwrap();
        assert!(ctx.render(&resource).unwrap().is_ready());
    }
    assert_eq!(server_spy.fetches(), 2);

    let snapshot = extractor.data();
    assert!(extractor.script().unwrap().contains(r#""res":{"1":"#));

    let globals = Globals::new();
    let waiting = tokio::spawn({
        let globals = globals.clone();
        async move { globals.preload(DEFAULT_CACHE_VAR).await }
    });
    globals.install(DEFAULT_CACHE_VAR, snapshot);
    waiting.await.unwrap().unwrap();

    let client_spy = Arc::new(Spy::default());
    let client = ResourceFactory::new(
        instant_fetch(client_spy.clone()),
        FactoryOptions::new().id("res").globals(globals.clone()),
    )
    .unwrap();

    for req in [1, 2] {
        let resource = client.create(req).unwrap();
        assert_eq!(
            resource.read().unwrap().ready(),
            Some(json!({ "msg": format!("Loaded {}", req) }))
        );
    }
    assert_eq!(client_spy.fetches(), 0);
    assert!(globals.is_drained(DEFAULT_CACHE_VAR));
}

/// Changing the request cancels the old fetch on commit and starts a new one.
#[tokio::test]
async fn hook_switches_requests() {
    let spy = Arc::new(Spy::default());
    let gate = Gate::new();
    let factory = ResourceFactory::new(
        gated_fetch(spy.clone(), gate.clone()),
        FactoryOptions::new().serialize(true),
    )
    .unwrap();
    let mut hook = ResourceHook::new();

    let first = factory.use_resource(&mut hook, 1).unwrap();
    hook.commit();
    assert_eq!(spy.fetches(), 1);

    let second = factory.use_resource(&mut hook, 2).unwrap();
    assert!(!first.ptr_eq(&second));
    hook.commit();
    assert_eq!(spy.fetches(), 2);
    assert_eq!(spy.aborts(), 1);
    assert!(!factory.has_cache_entry(&1).unwrap());

    gate.open();
    assert_eq!(wait_ready(&second).await, json!({ "msg": "Loaded 2" }));

    hook.unmount();
    assert_eq!(factory.cache_len(), 0);
}

/// Outside a tokio runtime a pending fetch errors instead of panicking.
#[test]
fn pending_fetch_outside_runtime_errors() {
    let spy = Arc::new(Spy::default());
    let factory = ResourceFactory::new(
        gated_fetch(spy.clone(), Gate::new()),
        FactoryOptions::new().serialize(true),
    )
    .unwrap();

    let resource = factory.create(1).unwrap();
    assert_eq!(spy.fetches(), 1);
    assert!(resource.is_errored());
    assert!(matches!(resource.read().unwrap(), Read::Failed(_)));

    resource.dispose();
    assert!(!factory.has_cache_entry(&1).unwrap());
}
