//! Integration tests for the Redis backend
//!
//! Requires Docker; run with `--features redis-tests`.

#![cfg(feature = "redis-tests")]

use rstest::*;
use serial_test::serial;
use shiftdesk_conf::StoreSettings;
use shiftdesk_store::{KeyValueStore, StoreClient};
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;

/// Start a Redis container and return settings pointing at it
async fn setup_test_redis() -> (ContainerAsync<Redis>, StoreSettings) {
	let container = Redis::default()
		.start()
		.await
		.expect("Failed to start Redis container");

	let port = container
		.get_host_port_ipv4(6379)
		.await
		.expect("Failed to get Redis port");

	let mut settings = StoreSettings::default();
	settings.host = "127.0.0.1".to_string();
	settings.port = port;

	(container, settings)
}

#[rstest]
#[tokio::test]
#[serial(redis)]
async fn test_connect_and_basic_commands() {
	let (_container, settings) = setup_test_redis().await;
	let client = StoreClient::connect(&settings)
		.await
		.expect("Failed to connect");
	let store = client.store();

	store
		.set("greeting", "hello", Some(Duration::from_secs(60)))
		.await
		.unwrap();
	assert_eq!(store.get("greeting").await.unwrap(), Some("hello".to_string()));
	assert!(store.exists("greeting").await.unwrap());

	store.sadd("members", "a").await.unwrap();
	store.sadd("members", "b").await.unwrap();
	store.srem("members", "a").await.unwrap();
	assert_eq!(store.smembers("members").await.unwrap(), vec!["b".to_string()]);

	store
		.hset_multiple(
			"ws:connection:x",
			&[
				("user_id".to_string(), "42".to_string()),
				("is_manager".to_string(), "true".to_string()),
			],
		)
		.await
		.unwrap();
	let fields = store.hgetall("ws:connection:x").await.unwrap();
	assert_eq!(fields.get("user_id").map(String::as_str), Some("42"));
	assert!(store.expire("ws:connection:x", Duration::from_secs(10)).await.unwrap());

	let mut keys = store.scan_match("ws:*").await.unwrap();
	keys.sort();
	assert_eq!(keys, vec!["ws:connection:x".to_string()]);

	let removed = store
		.delete(&["greeting".to_string(), "missing".to_string()])
		.await
		.unwrap();
	assert_eq!(removed, 1);
}

#[rstest]
#[tokio::test]
#[serial(redis)]
async fn test_health_checks() {
	let (_container, settings) = setup_test_redis().await;
	let client = StoreClient::connect(&settings)
		.await
		.expect("Failed to connect");

	assert!(client.health_check().await);
	assert!(client.connection().await.is_ok());

	let blocking = client.clone();
	let healthy = tokio::task::spawn_blocking(move || blocking.health_check_blocking())
		.await
		.unwrap();
	assert!(healthy);
}
