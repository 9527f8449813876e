use chrono::Duration;
use iot_relay::buffer::{BufferConfig, MessageBuffer};
use iot_relay::clock::{Clock, ManualClock};
use iot_relay::repository::entities::SubmitStatus;
use iot_relay::repository::interface::CommandRepository;
use iot_relay::repository::Repository;
use iot_relay::settings::Setup;
use iot_relay::RelayError;
use std::sync::Arc;

const BACKENDS: [&str; 2] = ["memory", "sqlite::memory:"];

async fn repository(database: &str, capacity: usize) -> (Repository, ManualClock) {
    let yaml = format!("database: \"{database}\"\ncommand_capacity: {capacity}\n");
    let setup = Setup::from_reader(yaml.as_bytes()).expect("cannot read setup");
    let clock = ManualClock::default();
    let mut repo = Repository::new(&setup, Arc::new(clock.clone()))
        .await
        .expect("cannot create repository");
    repo.migrate().await.expect("cannot migrate repository");
    (repo, clock)
}

async fn commands(repo: &Repository) -> Vec<String> {
    repo.list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.command)
        .collect()
}

#[tokio::test]
async fn command_store_capacity_two_scenario() {
    for backend in BACKENDS {
        let (repo, clock) = repository(backend, 2).await;

        let a = repo.submit("a").await.unwrap();
        assert_eq!(a.status, SubmitStatus::Inserted, "{backend}");
        assert_eq!(repo.count().await.unwrap(), 1, "{backend}");
        clock.advance(Duration::seconds(1));

        let b = repo.submit("b").await.unwrap();
        assert_eq!(b.status, SubmitStatus::Inserted, "{backend}");
        assert_eq!(repo.count().await.unwrap(), 2, "{backend}");
        clock.advance(Duration::seconds(1));

        let c = repo.submit("c").await.unwrap();
        assert_eq!(c.status, SubmitStatus::Inserted, "{backend}");
        assert_eq!(c.evicted.unwrap().id, a.record.id, "{backend}");
        assert_eq!(commands(&repo).await, vec!["c", "b"], "{backend}");
        clock.advance(Duration::seconds(1));

        let b_again = repo.submit("b").await.unwrap();
        assert_eq!(b_again.status, SubmitStatus::Updated, "{backend}");
        assert_eq!(b_again.record.id, b.record.id, "{backend}");
        assert_eq!(commands(&repo).await, vec!["b", "c"], "{backend}");

        let latest = repo.latest().await.unwrap().unwrap();
        assert_eq!(latest.command, "b", "{backend}");
        assert_eq!(latest.created_at, clock.now(), "{backend}");

        repo.close().await;
    }
}

#[tokio::test]
async fn command_store_never_exceeds_default_capacity() {
    for backend in BACKENDS {
        let (repo, clock) = repository(backend, 50).await;

        for i in 0..75 {
            repo.submit(&format!("set:{}", i % 60)).await.unwrap();
            clock.advance(Duration::milliseconds(5));
            assert!(repo.count().await.unwrap() <= 50, "{backend}");
        }

        let all = commands(&repo).await;
        assert_eq!(all.len(), 50, "{backend}");
        assert_eq!(all[0], "set:14", "{backend}");

        repo.close().await;
    }
}

#[tokio::test]
async fn command_store_delete_and_blank_input() {
    for backend in BACKENDS {
        let (repo, _clock) = repository(backend, 5).await;

        assert!(matches!(
            repo.submit("").await,
            Err(RelayError::InvalidInput(_))
        ));

        let s = repo.submit("lamp:toggle").await.unwrap();
        assert!(repo.delete_by_id(s.record.id).await.unwrap(), "{backend}");
        assert!(!repo.delete_by_id(s.record.id).await.unwrap(), "{backend}");
        assert_eq!(repo.latest().await.unwrap(), None, "{backend}");

        repo.close().await;
    }
}

#[test]
fn message_buffer_scenario_and_expiry() {
    let clock = ManualClock::default();
    let buffer = MessageBuffer::new(
        BufferConfig {
            capacity: 3,
            ttl: Duration::minutes(15),
        },
        Arc::new(clock.clone()),
    );

    for m in ["m1", "m2", "m3", "m4"] {
        buffer.push(Some("esp-01"), m).unwrap();
    }
    let listed: Vec<String> = buffer.list().into_iter().map(|m| m.message).collect();
    assert_eq!(listed, vec!["m4", "m3", "m2"]);

    clock.advance(Duration::minutes(15) - Duration::milliseconds(1));
    assert_eq!(buffer.list().len(), 3);

    clock.advance(Duration::milliseconds(2));
    assert_eq!(buffer.sweep(), 3);
    assert!(buffer.list().is_empty());
}
