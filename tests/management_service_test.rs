use std::{
    env, fs,
    panic::{self, AssertUnwindSafe},
    process::{Command, Stdio},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        mpsc, Arc,
    },
    thread,
    time::{Duration, Instant},
};

use log::LevelFilter;

use vchain_management::{
    config::{Configuration, DocumentProviderConfiguration},
    management::{ManagementError, ManagementSpec},
    provider::{
        document::{DocumentError, DocumentProvider},
        memory::MemoryProvider,
        Provider, ProviderError,
    },
    topology_consumer::TopologyConsumer,
    types::{
        data_types::{NodeIdentity, ProtocolVersion, ReferenceTime, VirtualChainID},
        snapshot::{ManagementSnapshot, TermKind},
        terms::{CommitteeTerm, ProtocolVersionTerm, SubscriptionTerm},
        topology::{GossipPeer, Topology},
    },
};

mod common;

use common::{
    consumer::RecordingConsumer,
    documents::{document, to_bytes, write_document},
    identities::{descending, random_identities},
    logging::setup_logger,
};

const VIRTUAL_CHAIN_ID: u32 = 42;

fn reference(int: u64) -> ReferenceTime {
    ReferenceTime::new(int)
}

fn configuration(refresh_interval: Duration) -> Configuration {
    Configuration::builder()
        .refresh_interval(refresh_interval)
        .log_events(true)
        .build()
}

fn document_provider(path: String) -> DocumentProvider {
    DocumentProvider::new(
        DocumentProviderConfiguration::builder()
            .location(path)
            .virtual_chain_id(VirtualChainID::new(VIRTUAL_CHAIN_ID))
            .build(),
    )
    .unwrap()
}

// Poll `condition` until it holds, failing the test after a generous deadline.
fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn start_serves_initial_snapshot_test() {
    setup_logger(LevelFilter::Trace);

    let identities = random_identities(5);
    let topology = vec![GossipPeer::new(identities[4], "10.0.0.5", 4400)];
    let provider = MemoryProvider::new(identities[0..4].to_vec(), topology.clone());
    let consumer = RecordingConsumer::new();

    let management = ManagementSpec::builder()
        .provider(provider.clone())
        .topology_consumer(consumer.clone())
        .configuration(configuration(Duration::ZERO))
        .build()
        .start();

    let expected = provider.get(reference(0)).unwrap();
    assert_eq!(*management.snapshot(), expected);
    assert_eq!(management.get_current_reference(), expected.current_reference());
    assert_eq!(management.get_genesis_reference(), expected.genesis_reference());
    assert_eq!(management.get_committee(reference(0)).members(), &identities[0..4]);
    assert_eq!(
        management.get_protocol_version(reference(0)),
        ProtocolVersion::MAXIMAL_SUPPORTED
    );
    assert!(management.get_subscription_status(reference(0)));

    let pushed = consumer.updates();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0], management.get_topology());
    assert_eq!(pushed[0].get(&identities[4]), Some(&topology[0]));
}

#[test]
#[should_panic]
fn start_panics_when_initial_refresh_fails_test() {
    setup_logger(LevelFilter::Trace);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json").to_str().unwrap().to_string();

    ManagementSpec::builder()
        .provider(document_provider(path))
        .topology_consumer(RecordingConsumer::new())
        .configuration(configuration(Duration::from_millis(10)))
        .build()
        .start();
}

#[test]
fn try_start_reports_initial_refresh_failure_test() {
    setup_logger(LevelFilter::Trace);

    let dir = tempfile::tempdir().unwrap();
    let identities = random_identities(4);
    let path = write_document(
        dir.path(),
        "management.json",
        &document(17, 10, &[(0, identities)], &[]),
    );
    let consumer = RecordingConsumer::new();
    let (failure_sender, failure_receiver) = mpsc::channel();

    let result = ManagementSpec::builder()
        .provider(document_provider(path))
        .topology_consumer(consumer.clone())
        .configuration(configuration(Duration::from_millis(10)))
        .on_refresh_failure(move |event| failure_sender.send(event.initial).unwrap())
        .build()
        .try_start();

    assert!(matches!(
        result,
        Err(ManagementError::Provider(ProviderError::Document(
            DocumentError::VirtualChainNotFound { .. }
        )))
    ));
    assert_eq!(consumer.update_count(), 0);
    // The event bus is shut down only after delivering the failure.
    assert_eq!(failure_receiver.try_recv(), Ok(true));
}

/// A provider whose snapshots have an empty committee sequence.
struct EmptyCommitteeProvider;

impl Provider for EmptyCommitteeProvider {
    fn get(&self, _: ReferenceTime) -> Result<ManagementSnapshot, ProviderError> {
        Ok(ManagementSnapshot::builder()
            .committees(Vec::new())
            .protocol_versions(vec![ProtocolVersionTerm::new(
                reference(0),
                ProtocolVersion::MINIMAL,
            )])
            .subscriptions(vec![SubscriptionTerm::new(reference(0), true)])
            .build())
    }
}

#[test]
fn empty_term_sequence_is_rejected_test() {
    setup_logger(LevelFilter::Trace);

    let result = ManagementSpec::builder()
        .provider(EmptyCommitteeProvider)
        .topology_consumer(RecordingConsumer::new())
        .configuration(configuration(Duration::ZERO))
        .build()
        .try_start();

    assert!(matches!(
        result,
        Err(ManagementError::EmptyTermSequence {
            kind: TermKind::Committee
        })
    ));
}

#[test]
fn periodic_refresh_picks_up_changes_test() {
    setup_logger(LevelFilter::Trace);

    let identities = random_identities(8);
    let provider = MemoryProvider::new(identities[0..4].to_vec(), Vec::new());
    let consumer = RecordingConsumer::new();

    let management = ManagementSpec::builder()
        .provider(provider.clone())
        .topology_consumer(consumer.clone())
        .configuration(configuration(Duration::from_millis(20)))
        .build()
        .start();

    let now = management.get_current_reference();
    provider
        .append_committee(now + 10, identities[4..8].to_vec())
        .unwrap();

    wait_until(|| management.get_committee(now + 10).members() == &identities[4..8]);
    assert_eq!(management.get_committee(now + 9).members(), &identities[0..4]);
    assert_eq!(management.get_current_reference(), now + 10);
    assert!(consumer.update_count() >= 2);
}

#[test]
fn periodic_refresh_failure_keeps_last_snapshot_test() {
    setup_logger(LevelFilter::Trace);

    let dir = tempfile::tempdir().unwrap();
    let identities = random_identities(8);
    let path = write_document(
        dir.path(),
        "management.json",
        &document(VIRTUAL_CHAIN_ID, 10, &[(0, identities[0..4].to_vec())], &[]),
    );

    let failures = Arc::new(AtomicUsize::new(0));
    let failures_handle = Arc::clone(&failures);
    let management = ManagementSpec::builder()
        .provider(document_provider(path.clone()))
        .topology_consumer(RecordingConsumer::new())
        .configuration(configuration(Duration::from_millis(20)))
        .on_refresh_failure(move |event| {
            assert!(!event.initial);
            failures_handle.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .start();

    let before = management.snapshot();

    fs::write(&path, b"{ this is not json").unwrap();
    wait_until(|| failures.load(Ordering::SeqCst) >= 2);
    assert_eq!(management.snapshot(), before);
    assert_eq!(
        management.get_committee(reference(10)).members(),
        descending(&identities[0..4]).as_slice()
    );

    // The service recovers once the document is fixed.
    fs::write(
        &path,
        to_bytes(&document(
            VIRTUAL_CHAIN_ID,
            20,
            &[(0, identities[0..4].to_vec()), (20, identities[4..8].to_vec())],
            &[],
        )),
    )
    .unwrap();
    wait_until(|| management.get_current_reference() == reference(20));
    assert_eq!(
        management.get_committee(reference(20)).members(),
        descending(&identities[4..8]).as_slice()
    );
}

#[test]
fn explicit_refresh_test() {
    setup_logger(LevelFilter::Trace);

    let identities = random_identities(8);
    let provider = MemoryProvider::new(identities[0..4].to_vec(), Vec::new());
    let consumer = RecordingConsumer::new();
    let (changed_sender, changed_receiver) = mpsc::channel();

    let management = ManagementSpec::builder()
        .provider(provider.clone())
        .topology_consumer(consumer.clone())
        .configuration(configuration(Duration::ZERO))
        .on_refresh_snapshot(move |event| changed_sender.send(event.content_changed).unwrap())
        .build()
        .start();

    // Nothing refreshes in the background.
    let now = management.get_current_reference();
    provider
        .append_committee(now + 5, identities[4..8].to_vec())
        .unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(management.get_committee(now + 5).members(), &identities[0..4]);

    management.refresh().unwrap();
    assert_eq!(management.get_committee(now + 5).members(), &identities[4..8]);

    management.refresh().unwrap();
    assert_eq!(consumer.update_count(), 3);

    drop(management);
    let changed: Vec<bool> = changed_receiver.try_iter().collect();
    assert_eq!(changed, vec![true, true, false]);
}

#[test]
fn explicit_refresh_failure_is_returned_test() {
    setup_logger(LevelFilter::Trace);

    let dir = tempfile::tempdir().unwrap();
    let identities = random_identities(4);
    let path = write_document(
        dir.path(),
        "management.json",
        &document(VIRTUAL_CHAIN_ID, 10, &[(0, identities)], &[]),
    );
    let management = ManagementSpec::builder()
        .provider(document_provider(path.clone()))
        .topology_consumer(RecordingConsumer::new())
        .configuration(configuration(Duration::ZERO))
        .build()
        .start();
    let before = management.snapshot();

    fs::remove_file(&path).unwrap();

    assert!(matches!(
        management.refresh(),
        Err(ManagementError::Provider(ProviderError::Retrieval(_)))
    ));
    assert_eq!(management.snapshot(), before);
}

#[test]
fn refresh_without_virtual_chain_keeps_snapshot_test() {
    setup_logger(LevelFilter::Trace);

    let dir = tempfile::tempdir().unwrap();
    let identities = random_identities(8);
    let path = write_document(
        dir.path(),
        "management.json",
        &document(VIRTUAL_CHAIN_ID, 10, &[(0, identities[0..4].to_vec())], &[]),
    );
    let consumer = RecordingConsumer::new();
    let management = ManagementSpec::builder()
        .provider(document_provider(path))
        .topology_consumer(consumer.clone())
        .configuration(configuration(Duration::ZERO))
        .build()
        .start();
    let before = management.snapshot();

    // The rewritten document only describes another virtual chain.
    write_document(
        dir.path(),
        "management.json",
        &document(17, 20, &[(0, identities[4..8].to_vec())], &[]),
    );

    assert!(matches!(
        management.refresh(),
        Err(ManagementError::Provider(ProviderError::Document(
            DocumentError::VirtualChainNotFound { .. }
        )))
    ));
    assert!(Arc::ptr_eq(&management.snapshot(), &before));
    assert_eq!(
        management.get_committee(reference(20)).members(),
        descending(&identities[0..4]).as_slice()
    );
    assert_eq!(consumer.update_count(), 1);
}

#[test]
fn refresher_lifecycle_events_test() {
    setup_logger(LevelFilter::Trace);

    let started = Arc::new(AtomicBool::new(false));
    let stopped = Arc::new(AtomicBool::new(false));
    let (started_handle, stopped_handle) = (Arc::clone(&started), Arc::clone(&stopped));

    let management = ManagementSpec::builder()
        .provider(MemoryProvider::new(random_identities(4), Vec::new()))
        .topology_consumer(RecordingConsumer::new())
        .configuration(configuration(Duration::from_secs(3600)))
        .on_start_refresher(move |event| {
            assert_eq!(event.interval, Duration::from_secs(3600));
            started_handle.store(true, Ordering::SeqCst)
        })
        .on_stop_refresher(move |_| stopped_handle.store(true, Ordering::SeqCst))
        .build()
        .start();

    wait_until(|| started.load(Ordering::SeqCst));
    assert!(!stopped.load(Ordering::SeqCst));

    // Dropping interrupts the hour-long wait.
    let dropped_at = Instant::now();
    drop(management);
    assert!(dropped_at.elapsed() < Duration::from_secs(5));
    assert!(stopped.load(Ordering::SeqCst));
}

#[test]
fn no_refresher_without_interval_test() {
    setup_logger(LevelFilter::Trace);

    let started = Arc::new(AtomicBool::new(false));
    let started_handle = Arc::clone(&started);

    let management = ManagementSpec::builder()
        .provider(MemoryProvider::new(random_identities(4), Vec::new()))
        .topology_consumer(RecordingConsumer::new())
        .configuration(configuration(Duration::ZERO))
        .on_start_refresher(move |_| started_handle.store(true, Ordering::SeqCst))
        .build()
        .start();

    drop(management);
    assert!(!started.load(Ordering::SeqCst));
}

/// A provider that serves one of two fixed snapshots, switching between them atomically.
struct SwitchingProvider {
    snapshots: [ManagementSnapshot; 2],
    switched: Arc<AtomicBool>,
}

impl Provider for SwitchingProvider {
    fn get(&self, _: ReferenceTime) -> Result<ManagementSnapshot, ProviderError> {
        let index = self.switched.load(Ordering::SeqCst) as usize;
        Ok(self.snapshots[index].clone())
    }
}

fn snapshot_of(members: &[NodeIdentity], peers: &[GossipPeer]) -> ManagementSnapshot {
    ManagementSnapshot::builder()
        .topology(peers.to_vec())
        .committees(vec![CommitteeTerm::new(reference(0), members.to_vec())])
        .protocol_versions(vec![ProtocolVersionTerm::new(reference(0), ProtocolVersion::MINIMAL)])
        .subscriptions(vec![SubscriptionTerm::new(reference(0), true)])
        .build()
}

#[test]
fn concurrent_readers_see_whole_snapshots_test() {
    setup_logger(LevelFilter::Info);

    let old_members = random_identities(4);
    let new_members = random_identities(4);
    let old_peers = vec![GossipPeer::new(old_members[0], "10.0.0.1", 4400)];
    let new_peers = vec![GossipPeer::new(new_members[0], "10.0.1.1", 4400)];

    let switched = Arc::new(AtomicBool::new(false));
    let management = ManagementSpec::builder()
        .provider(SwitchingProvider {
            snapshots: [
                snapshot_of(&old_members, &old_peers),
                snapshot_of(&new_members, &new_peers),
            ],
            switched: Arc::clone(&switched),
        })
        .topology_consumer(RecordingConsumer::new())
        .configuration(configuration(Duration::from_millis(1)))
        .build()
        .start();

    let done = AtomicBool::new(false);
    let observed_new = AtomicUsize::new(0);
    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    // Committee and topology always come from the same snapshot.
                    let snapshot = management.snapshot();
                    let committee = snapshot.committee_at(reference(100));
                    if committee.members() == old_members.as_slice() {
                        assert_eq!(snapshot.topology(), old_peers.as_slice());
                    } else {
                        assert_eq!(committee.members(), new_members.as_slice());
                        assert_eq!(snapshot.topology(), new_peers.as_slice());
                        observed_new.fetch_add(1, Ordering::SeqCst);
                    }

                    let committee = management.get_committee(reference(100));
                    assert!(
                        committee.members() == old_members.as_slice()
                            || committee.members() == new_members.as_slice()
                    );
                }
            });
        }

        thread::sleep(Duration::from_millis(50));
        switched.store(true, Ordering::SeqCst);
        wait_until(|| observed_new.load(Ordering::SeqCst) > 0);
        thread::sleep(Duration::from_millis(50));
        done.store(true, Ordering::SeqCst);
    });

    assert_eq!(
        management.get_committee(reference(100)).members(),
        new_members.as_slice()
    );
}

/// A topology consumer that panics on every update after the first.
struct PanickingConsumer {
    updates: usize,
}

impl TopologyConsumer for PanickingConsumer {
    fn update_topology(&mut self, _: Topology) {
        self.updates += 1;
        if self.updates > 1 {
            panic!("topology consumer failed on update {}", self.updates);
        }
    }
}

const CONSUMER_PANIC_CHILD: &str = "VCHAIN_MANAGEMENT_CONSUMER_PANIC_CHILD";
const SIGABRT: i32 = 6;

// The failure ends the process, so the scenario runs in a child copy of this test binary.
#[cfg(unix)]
#[test]
fn consumer_panic_during_background_refresh_aborts_test() {
    use std::os::unix::process::ExitStatusExt;

    if env::var_os(CONSUMER_PANIC_CHILD).is_some() {
        setup_logger(LevelFilter::Trace);

        let _management = ManagementSpec::builder()
            .provider(MemoryProvider::new(random_identities(4), Vec::new()))
            .topology_consumer(PanickingConsumer { updates: 0 })
            .configuration(configuration(Duration::from_millis(10)))
            .build()
            .start();

        // Returning normally means the failed refresh went unnoticed.
        thread::sleep(Duration::from_secs(5));
        return;
    }

    let status = Command::new(env::current_exe().unwrap())
        .args([
            "consumer_panic_during_background_refresh_aborts_test",
            "--exact",
            "--test-threads=1",
        ])
        .env(CONSUMER_PANIC_CHILD, "1")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .unwrap();

    assert_eq!(status.signal(), Some(SIGABRT));
}

#[test]
fn drop_joins_every_thread_before_resuming_a_panic_test() {
    setup_logger(LevelFilter::Trace);

    let refreshes = Arc::new(AtomicUsize::new(0));
    let management = ManagementSpec::builder()
        .provider(CountingProvider {
            inner: MemoryProvider::new(random_identities(4), Vec::new()),
            gets: Arc::clone(&refreshes),
        })
        .topology_consumer(RecordingConsumer::new())
        .configuration(configuration(Duration::from_millis(10)))
        .on_update_topology(|_| panic!("update topology handler failed"))
        .build()
        .start();

    wait_until(|| refreshes.load(Ordering::SeqCst) >= 2);

    let dropped = panic::catch_unwind(AssertUnwindSafe(move || drop(management)));
    assert!(dropped.is_err());

    // The refresher was stopped even though the event bus panicked.
    let after_drop = refreshes.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(refreshes.load(Ordering::SeqCst), after_drop);
}

/// A provider that counts how often it is asked for a snapshot.
struct CountingProvider {
    inner: MemoryProvider,
    gets: Arc<AtomicUsize>,
}

impl Provider for CountingProvider {
    fn get(&self, reference: ReferenceTime) -> Result<ManagementSnapshot, ProviderError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(reference)
    }
}

/// A provider that panics on its second request.
struct PanicOnceProvider {
    inner: MemoryProvider,
    gets: AtomicUsize,
}

impl Provider for PanicOnceProvider {
    fn get(&self, reference: ReferenceTime) -> Result<ManagementSnapshot, ProviderError> {
        if self.gets.fetch_add(1, Ordering::SeqCst) == 1 {
            panic!("provider failed");
        }
        self.inner.get(reference)
    }
}

#[test]
#[should_panic(expected = "A previous management refresh panicked.")]
fn refresh_after_provider_panic_panics_test() {
    setup_logger(LevelFilter::Trace);

    let management = ManagementSpec::builder()
        .provider(PanicOnceProvider {
            inner: MemoryProvider::new(random_identities(4), Vec::new()),
            gets: AtomicUsize::new(0),
        })
        .topology_consumer(RecordingConsumer::new())
        .configuration(configuration(Duration::ZERO))
        .build()
        .start();

    let failed = panic::catch_unwind(AssertUnwindSafe(|| management.refresh()));
    assert!(failed.is_err());

    let _ = management.refresh();
}
