use bytes::Bytes;
use memdis::client::Client;
use memdis::frame::Frame;
use memdis::server::{serve, Config};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

async fn start_server(config: Config) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(serve(listener, config));

    addr
}

async fn connect() -> Client {
    let addr = start_server(Config::default()).await;
    Client::connect(addr).await.unwrap()
}

fn bulk(value: &'static str) -> Frame {
    Frame::Bulk(Bytes::from(value))
}

fn ok() -> Frame {
    Frame::Simple("OK".to_string())
}

#[tokio::test]
async fn set_and_get() {
    let mut client = connect().await;

    client.set("hello", Bytes::from("world")).await.unwrap();

    assert_eq!(client.get("hello").await.unwrap(), Some(Bytes::from("world")));
    assert_eq!(client.get("missing").await.unwrap(), None);
}

#[tokio::test]
async fn ping_and_echo() {
    let mut client = connect().await;

    assert_eq!(client.ping(None).await.unwrap(), Bytes::from("PONG"));
    assert_eq!(
        client.ping(Some(Bytes::from("hi"))).await.unwrap(),
        Bytes::from("hi")
    );
    assert_eq!(
        client.command(["ECHO", "hello world"]).await.unwrap(),
        bulk("hello world")
    );
}

#[tokio::test]
async fn lists() {
    let mut client = connect().await;

    assert_eq!(
        client.command(["RPUSH", "list", "a", "b", "c"]).await.unwrap(),
        Frame::Integer(3)
    );
    assert_eq!(
        client.command(["LPUSH", "list", "z"]).await.unwrap(),
        Frame::Integer(4)
    );
    assert_eq!(
        client.command(["LRANGE", "list", "0", "-1"]).await.unwrap(),
        Frame::Array(vec![bulk("z"), bulk("a"), bulk("b"), bulk("c")])
    );
    assert_eq!(
        client.command(["LINDEX", "list", "-1"]).await.unwrap(),
        bulk("c")
    );
    assert_eq!(
        client.command(["LINDEX", "list", "10"]).await.unwrap(),
        Frame::NullBulkString
    );
    assert_eq!(
        client.command(["LSET", "list", "0", "y"]).await.unwrap(),
        ok()
    );
    assert_eq!(client.command(["LPOP", "list"]).await.unwrap(), bulk("y"));
    assert_eq!(client.command(["RPOP", "list"]).await.unwrap(), bulk("c"));
    assert_eq!(
        client.command(["LREM", "list", "0", "a"]).await.unwrap(),
        Frame::Integer(1)
    );
    assert_eq!(client.llen("list").await.unwrap(), 1);
    assert_eq!(client.command(["RPOP", "list"]).await.unwrap(), bulk("b"));
    assert_eq!(
        client.command(["EXISTS", "list"]).await.unwrap(),
        Frame::Integer(0)
    );
}

#[tokio::test]
async fn hashes() {
    let mut client = connect().await;

    assert_eq!(
        client
            .command(["HSET", "user", "name", "ada", "lang", "rust"])
            .await
            .unwrap(),
        Frame::Integer(2)
    );
    assert_eq!(
        client.command(["HGET", "user", "name"]).await.unwrap(),
        bulk("ada")
    );
    assert_eq!(
        client.command(["HEXISTS", "user", "age"]).await.unwrap(),
        Frame::Integer(0)
    );
    assert_eq!(
        client.command(["HMSET", "user", "age", "36"]).await.unwrap(),
        ok()
    );
    assert_eq!(
        client.command(["HLEN", "user"]).await.unwrap(),
        Frame::Integer(3)
    );
    assert_eq!(
        client.command(["HDEL", "user", "name", "lang", "age"]).await.unwrap(),
        Frame::Integer(3)
    );
    assert_eq!(
        client.command(["TYPE", "user"]).await.unwrap(),
        Frame::Simple("none".to_string())
    );
}

#[tokio::test]
async fn wrong_type_leaves_value_untouched() {
    let mut client = connect().await;

    client.set("key", Bytes::from("1")).await.unwrap();

    let err = client.rpush("key", Bytes::from("a")).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "WRONGTYPE Operation against a key holding the wrong kind of value"
    );

    assert_eq!(
        client.command(["HGET", "key", "f"]).await.unwrap(),
        Frame::Error("WRONGTYPE Operation against a key holding the wrong kind of value".to_string())
    );
    assert_eq!(client.get("key").await.unwrap(), Some(Bytes::from("1")));
}

#[tokio::test]
async fn errors_do_not_close_the_connection() {
    let mut client = connect().await;

    assert_eq!(
        client.command(["GET"]).await.unwrap(),
        Frame::Error("ERR wrong number of arguments for 'get' command".to_string())
    );
    assert_eq!(
        client.command(["NOPE", "a"]).await.unwrap(),
        Frame::Error("ERR unknown command 'nope'".to_string())
    );
    assert_eq!(
        client.command(["EXPIRE", "key", "soon"]).await.unwrap(),
        Frame::Error("ERR value is not an integer or out of range".to_string())
    );
    assert_eq!(
        client.command(["RENAME", "a", "b"]).await.unwrap(),
        Frame::Error("ERR no such key".to_string())
    );

    client.set("key", Bytes::from("1")).await.unwrap();
    assert_eq!(
        client
            .command(["EXPIRE", "key", "9223372036854775807"])
            .await
            .unwrap(),
        Frame::Error("ERR invalid expire time in 'expire' command".to_string())
    );

    assert_eq!(client.ping(None).await.unwrap(), Bytes::from("PONG"));
}

#[tokio::test]
async fn rename_keeps_ttl() {
    let mut client = connect().await;

    client.set("a", Bytes::from("1")).await.unwrap();
    assert_eq!(
        client.command(["EXPIRE", "a", "100"]).await.unwrap(),
        Frame::Integer(1)
    );
    assert_eq!(client.command(["RENAME", "a", "b"]).await.unwrap(), ok());

    assert_eq!(client.get("a").await.unwrap(), None);
    assert_eq!(client.command(["TTL", "b"]).await.unwrap(), Frame::Integer(100));
    assert_eq!(
        client.command(["PERSIST", "b"]).await.unwrap(),
        Frame::Integer(1)
    );
    assert_eq!(client.command(["TTL", "b"]).await.unwrap(), Frame::Integer(-1));
}

#[tokio::test]
async fn keys_and_dbsize() {
    let mut client = connect().await;

    client.set("user:1", Bytes::from("a")).await.unwrap();
    client.set("user:2", Bytes::from("b")).await.unwrap();
    client.rpush("queue", Bytes::from("c")).await.unwrap();

    assert_eq!(
        client.command(["DBSIZE"]).await.unwrap(),
        Frame::Integer(3)
    );

    let keys = match client.command(["KEYS", "user:*"]).await.unwrap() {
        Frame::Array(keys) => keys,
        frame => panic!("expected an array, got {:?}", frame),
    };
    assert_eq!(keys.len(), 2);

    assert_eq!(
        client.command(["DEL", "user:1", "user:2", "user:3"]).await.unwrap(),
        Frame::Integer(2)
    );
    assert_eq!(client.command(["FLUSHALL"]).await.unwrap(), ok());
    assert_eq!(
        client.command(["DBSIZE"]).await.unwrap(),
        Frame::Integer(0)
    );
}

#[tokio::test]
async fn concurrent_clients_share_the_store() {
    let addr = start_server(Config::default()).await;

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            tokio::spawn(async move {
                let mut client = Client::connect(addr).await.unwrap();
                for _ in 0..25 {
                    client.rpush("shared", Bytes::from("x")).await.unwrap();
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    let mut client = Client::connect(addr).await.unwrap();
    assert_eq!(client.llen("shared").await.unwrap(), 200);
}

#[tokio::test]
async fn dump_is_loaded_on_start() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dump.memdis");

    let store = memdis::store::Store::new();
    store.lock().set("greeting".to_string(), Bytes::from("hello world"));
    store.lock().rpush("list", Bytes::from("a")).unwrap();
    store.dump(&path).unwrap();

    let config = Config {
        dump_path: Some(path),
        snapshot_interval: Duration::from_secs(3600),
        ..Config::default()
    };
    let addr = start_server(config).await;
    let mut client = Client::connect(addr).await.unwrap();

    assert_eq!(
        client.get("greeting").await.unwrap(),
        Some(Bytes::from("hello world"))
    );
    assert_eq!(client.llen("list").await.unwrap(), 1);
}

#[tokio::test]
async fn inline_commands() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let addr = start_server(Config::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"SET greeting \"hello world\"\r\nGET greeting\r\n")
        .await
        .unwrap();

    let expected = b"+OK\r\n$11\r\nhello world\r\n";
    let mut reply = vec![0; expected.len()];
    stream.read_exact(&mut reply).await.unwrap();

    assert_eq!(&reply[..], &expected[..]);
}

#[tokio::test]
async fn protocol_error_closes_the_connection() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let addr = start_server(Config::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"*1\r\n$x\r\n").await.unwrap();

    let mut reply = vec![];
    stream.read_to_end(&mut reply).await.unwrap();

    assert!(reply.starts_with(b"-ERR Protocol error"));
}

#[tokio::test]
async fn deeply_nested_command_does_not_take_the_server_down() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let addr = start_server(Config::default()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&b"*1\r\n".repeat(1_000)).await.unwrap();

    // The server may reset the socket before everything was read, so the reply is optional.
    let mut reply = vec![];
    let _ = stream.read_to_end(&mut reply).await;
    assert!(reply.is_empty() || reply.starts_with(b"-ERR Protocol error"));

    let mut client = Client::connect(addr).await.unwrap();
    assert_eq!(client.ping(None).await.unwrap(), Bytes::from("PONG"));
}
