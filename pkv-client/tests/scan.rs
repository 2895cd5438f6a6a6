mod support;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use pkv_client::scan::scan_all;
use pkv_client::{Client, Reply, ScanParams};
use support::{bulk, init_tracing, reply, FakeServer, MemoryStore};

#[tokio::test]
async fn sscan_covers_a_static_set() {
    init_tracing();
    let server = MemoryStore::serve().await;
    let client = Client::connect(server.addr.clone()).unwrap();

    let members: Vec<String> = (0..25).map(|i| format!("m{i:02}")).collect();
    let refs: Vec<&[u8]> = members.iter().map(|m| m.as_bytes()).collect();
    assert_eq!(client.sadd(b"s", &refs).await.unwrap(), 25);

    let seen = client.sscan_all(b"s", ScanParams::new().count(1)).await.unwrap();
    let seen: BTreeSet<Bytes> = seen.into_iter().collect();
    let expected: BTreeSet<Bytes> = members.into_iter().map(Bytes::from).collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn hscan_pages_through_field_value_pairs() {
    init_tracing();
    let server = MemoryStore::serve().await;
    let client = Client::connect(server.addr.clone()).unwrap();

    let pairs: [(&[u8], &[u8]); 3] = [(b"a", b"1"), (b"b", b"2"), (b"c", b"3")];
    client.hmset(b"h", &pairs).await.unwrap();

    let mut params = ScanParams::new().count(2);
    let mut pages = 0;
    let mut fields = Vec::new();
    loop {
        let page = client.hscan(b"h", &params).await.unwrap();
        pages += 1;
        for entry in page.entries {
            fields.push((entry.field, entry.value));
        }
        if !page.more {
            break;
        }
        params = params.cursor(page.cursor);
    }

    assert_eq!(pages, 2);
    assert_eq!(
        fields,
        vec![
            (Bytes::from_static(b"a"), Bytes::from_static(b"1")),
            (Bytes::from_static(b"b"), Bytes::from_static(b"2")),
            (Bytes::from_static(b"c"), Bytes::from_static(b"3")),
        ]
    );
}

#[tokio::test]
async fn empty_pages_do_not_end_the_scan() {
    init_tracing();
    // Pages: cursor 7 with nothing, cursor 3 with [a, b], terminal with [c].
    let server = FakeServer::start(|args| {
        let page = match &args[1][..] {
            b"0" => Reply::array(vec![bulk(b"7"), Reply::array(vec![])]),
            b"7" => Reply::array(vec![bulk(b"3"), Reply::array(vec![bulk(b"a"), bulk(b"b")])]),
            _ => Reply::array(vec![bulk(b"0"), Reply::array(vec![bulk(b"c")])]),
        };
        reply(page)
    })
    .await;
    let client = Client::connect(server.addr.clone()).unwrap();

    let keys = client.scan_all(ScanParams::new().pattern("*")).await.unwrap();
    assert_eq!(
        keys,
        vec![
            Bytes::from_static(b"a"),
            Bytes::from_static(b"b"),
            Bytes::from_static(b"c"),
        ]
    );

    let sent: Vec<String> = server
        .received()
        .iter()
        .map(|args| String::from_utf8_lossy(&args[1]).into_owned())
        .collect();
    assert_eq!(sent, vec!["0", "7", "3"]);
    assert!(server
        .received()
        .iter()
        .all(|args| &args[2][..] == b"MATCH" && &args[3][..] == b"*"));
}

#[tokio::test]
async fn scan_all_stops_only_on_the_terminal_cursor() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let entries = scan_all(ScanParams::new(), move |_params| {
        let call = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            let page = match call {
                0..=2 => Reply::array(vec![bulk(b"9"), Reply::array(vec![])]),
                _ => Reply::array(vec![bulk(b"0"), Reply::array(vec![bulk(b"x")])]),
            };
            pkv_client::interpreters::scan_values(page)
        }
    })
    .await
    .unwrap();

    assert_eq!(entries, vec![Bytes::from_static(b"x")]);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn scan_errors_stop_iteration() {
    init_tracing();
    let server = FakeServer::start(|_| reply(Reply::Error("ERR scan failed".into()))).await;
    let client = Client::connect(server.addr.clone()).unwrap();

    let err = client.scan_all(ScanParams::new()).await.unwrap_err();
    assert_eq!(err.remote_message(), Some("ERR scan failed"));
    assert_eq!(server.received().len(), 1);

    let err = client.scan(&ScanParams::new()).await.unwrap_err();
    assert!(err.remote_message().is_some());
}
