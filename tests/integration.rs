// tests/integration.rs

mod common;

use std::time::Duration;

use serde_json::json;

use common::{demo_methods, init_logging, CHILD, PARENT};
use frame_rpc::{
    // ---
    connect,
    expose,
    ConnectConfig,
    Connection,
    ConnectionBuilder,
    ConnectionState,
    ExposeConfig,
    Exposure,
    MemoryLink,
    Result,
    RpcError,
};

frame_rpc::remote_api! {
    /// Typed view of the demo widget.
    struct Widget {
        fn add(a: i64, b: i64) -> i64;
        fn greet(name: String) -> String;
        fn say_hello as "greet"(name: String) -> String;
        fn version() -> String;
    }
}

struct Pair {
    // ---
    link: MemoryLink,
    exposure: Exposure,
    connection: Connection,
}

impl Pair {
    // ---
    async fn new() -> Result<Self> {
        // ---
        let link = MemoryLink::new(PARENT, CHILD);

        let exposure = expose(link.embedded(), demo_methods(), ExposeConfig::new(PARENT)).await?;
        link.mark_loaded();

        let connection = connect(link.host(), ConnectConfig::new(CHILD)).await?;

        Ok(Self {
            link,
            exposure,
            connection,
        })
    }
}

#[tokio::test]
async fn test_add_end_to_end() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;
    assert_eq!(pair.connection.state(), ConnectionState::Established);

    log::info!("calling add(2, 3)");
    let sum: i64 = pair.connection.call("add", (2, 3)).await?;
    assert_eq!(sum, 5);
    assert_eq!(pair.connection.pending_calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_greet_end_to_end() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;

    let text: String = pair.connection.call("greet", ("World",)).await?;
    assert_eq!(text, "Hello, World!");

    Ok(())
}

#[tokio::test]
async fn test_typed_client() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;
    let widget = Widget::new(pair.connection.clone());

    assert_eq!(widget.add(20, 22).await?, 42);
    assert_eq!(widget.greet("Rust".into()).await?, "Hello, Rust!");
    assert_eq!(widget.say_hello("alias".into()).await?, "Hello, alias!");

    let err = widget.version().await.unwrap_err();
    assert_eq!(err.to_string(), "\"version\" is not a function.");

    Ok(())
}

#[tokio::test]
async fn test_concurrent_calls() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;

    let mut handles = Vec::new();
    for i in 0..10_i64 {
        let connection = pair.connection.clone();
        handles.push(tokio::spawn(async move {
            let sum: i64 = connection.call("add", (i, 100)).await?;
            Ok::<_, RpcError>((i, sum))
        }));
    }

    for handle in handles {
        let (i, sum) = handle.await.unwrap()?;
        assert_eq!(sum, i + 100);
    }

    Ok(())
}

#[tokio::test]
async fn test_inherited_names_are_not_exposed() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;

    for name in ["constructor", "toString", "__proto__", "missing"] {
        let err = pair.connection.call_raw(name, vec![]).await.unwrap_err();
        assert!(matches!(err, RpcError::Remote(_)), "{name}: {err:?}");
        assert!(err.to_string().contains("not exposed"), "{name}: {err}");
    }

    Ok(())
}

#[tokio::test]
async fn test_property_is_not_a_function() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;

    let err = pair.connection.call_raw("version", vec![]).await.unwrap_err();
    assert!(err.to_string().contains("is not a function"), "{err}");

    Ok(())
}

#[tokio::test]
async fn test_failure_carries_message_only() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;

    let err = pair.connection.call_raw("fail", vec![]).await.unwrap_err();
    match err {
        RpcError::Remote(text) => assert_eq!(text, "boom"),
        other => panic!("unexpected error: {other:?}"),
    }

    // the exposure keeps serving
    let sum: i64 = pair.connection.call("add", (1, 1)).await?;
    assert_eq!(sum, 2);

    Ok(())
}

#[tokio::test]
async fn test_panic_is_contained() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;

    let err = pair.connection.call_raw("explode", vec![]).await.unwrap_err();
    assert_eq!(err.to_string(), "kaboom");

    assert!(pair.exposure.is_active());
    let text: String = pair.connection.call("greet", ("again",)).await?;
    assert_eq!(text, "Hello, again!");

    Ok(())
}

#[tokio::test]
async fn test_invalid_arguments() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;

    let err = pair
        .connection
        .call_raw("add", vec![json!("two"), json!(3)])
        .await
        .unwrap_err();
    assert!(
        err.to_string().starts_with("Invalid arguments for \"add\""),
        "{err}"
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_destroyed_exposure_stops_answering() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;
    pair.exposure.destroy();
    assert!(!pair.exposure.is_active());

    let err = pair
        .connection
        .call_with_timeout::<_, i64>("add", (1, 2), Duration::from_millis(250))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "call to \"add\" timed out after 250ms");

    Ok(())
}

#[tokio::test]
async fn test_builder_connects() -> Result<()> {
    // ---
    init_logging();

    let link = MemoryLink::new(PARENT, CHILD);
    let _exposure = expose(link.embedded(), demo_methods(), ExposeConfig::new(PARENT)).await?;
    link.mark_loaded();

    let connection = ConnectionBuilder::new(link.host())
        .target_origin(CHILD)
        .call_timeout(Duration::from_secs(1))
        .connect()
        .await?;

    assert_eq!(connection.config().call_timeout, Duration::from_secs(1));
    assert_eq!(connection.target_origin().as_str(), CHILD);

    let sum: i64 = connection.call("add", (40, 2)).await?;
    assert_eq!(sum, 42);

    Ok(())
}

#[tokio::test]
async fn test_drop_releases_subscriptions() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;
    let Pair {
        link,
        exposure,
        connection,
    } = pair;

    assert_eq!(link.host_end().subscriber_count().await, 1);
    assert_eq!(link.embedded_end().subscriber_count().await, 1);

    drop(connection);
    drop(exposure);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(link.host_end().subscriber_count().await, 0);
    assert_eq!(link.embedded_end().subscriber_count().await, 0);

    Ok(())
}

#[tokio::test]
async fn test_independent_connections_share_a_link() -> Result<()> {
    // ---
    init_logging();

    let link = MemoryLink::new(PARENT, CHILD);
    let _exposure = expose(link.embedded(), demo_methods(), ExposeConfig::new(PARENT)).await?;
    link.mark_loaded();

    // both handshakes are in flight at once; each side sees the other's reply
    let (a, b) = tokio::join!(
        connect(link.host(), ConnectConfig::new(CHILD)),
        connect(link.host(), ConnectConfig::new(CHILD)),
    );
    let (a, b) = (Widget::new(a?), Widget::new(b?));
    assert_eq!(link.host_end().subscriber_count().await, 2);

    let (sum_a, sum_b) = tokio::join!(a.add(1, 2), b.add(10, 20));
    assert_eq!(sum_a?, 3);
    assert_eq!(sum_b?, 30);
    assert_eq!(a.connection().pending_calls(), 0);
    assert_eq!(b.connection().pending_calls(), 0);

    a.connection().destroy();
    assert_eq!(a.connection().state(), ConnectionState::Destroyed);
    assert!(matches!(a.add(1, 1).await, Err(RpcError::ConnectionDestroyed)));

    assert_eq!(b.connection().state(), ConnectionState::Established);
    assert_eq!(b.add(5, 5).await?, 10);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_closing_embedded_side_silences_exposure() -> Result<()> {
    // ---
    init_logging();

    let pair = Pair::new().await?;

    pair.link.embedded().close().await?;
    assert_eq!(pair.link.embedded_end().subscriber_count().await, 0);

    let err = pair
        .connection
        .call_with_timeout::<_, i64>("add", (1, 2), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "{err}");

    // the host side is untouched
    assert_eq!(pair.connection.state(), ConnectionState::Established);
    assert_eq!(pair.link.host_end().subscriber_count().await, 1);

    Ok(())
}
