use std::convert::Infallible;
use std::time::Duration;

use frame_rpc::{connect, expose, ConnectConfig, ExposeConfig, MemoryLink, MethodTable, Result};

const PARENT: &str = "https://parent.example.com";
const WIDGET: &str = "https://widget.example.com";

frame_rpc::remote_api! {
    struct Widget {
        fn add(a: i64, b: i64) -> i64;
        fn greet(name: String) -> String;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    env_logger::init();

    let link = MemoryLink::new(PARENT, WIDGET);

    // embedded side
    let methods = MethodTable::new()
        .method("add", |(a, b): (i64, i64)| async move { Ok::<_, Infallible>(a + b) })
        .method("greet", |(name,): (String,)| async move {
            Ok::<_, Infallible>(format!("Hello, {name}!"))
        });
    let exposure = expose(link.embedded(), methods, ExposeConfig::new(PARENT)).await?;

    // the widget finishes loading
    link.mark_loaded();

    // host side
    let config = ConnectConfig::new(WIDGET).with_call_timeout(Duration::from_secs(2));
    let connection = connect(link.host(), config).await?;
    let widget = Widget::new(connection.clone());

    println!("2 + 3 = {}", widget.add(2, 3).await?);
    println!("{}", widget.greet("World".into()).await?);

    match connection.call_raw("constructor", vec![]).await {
        Ok(value) => println!("unexpected: {value}"),
        Err(err) => println!("constructor: {err}"),
    }

    connection.destroy();
    exposure.destroy();
    Ok(())
}
