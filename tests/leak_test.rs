//! Outstanding-connection accounting.
//!
//! The counters are process-wide, so this binary holds a single test and
//! can assert exact movement.

mod common;

use bytes::Bytes;
use chromenet_response::http::{
    leaked_responses, outstanding_connections, BodyFeeder, FlowControlFeeder, Response,
};
use common::{test_url, ConnectionTracker};
use http::Method;

fn connected(tracker: &ConnectionTracker) -> (Response, FlowControlFeeder) {
    let mut response = Response::new(Method::GET, test_url());
    let feeder = response.setup(tracker.handle()).unwrap();
    (response, feeder)
}

#[tokio::test]
async fn test_outstanding_connections_follow_disposal() {
    let tracker = ConnectionTracker::new();
    let base = outstanding_connections();
    let leaked_before = leaked_responses();

    // read() releases.
    let (mut response, feeder) = connected(&tracker);
    assert_eq!(outstanding_connections(), base + 1);
    feeder.feed_data(Bytes::from_static(b"body"));
    feeder.feed_eof();
    response.read().await.unwrap();
    assert_eq!(outstanding_connections(), base);

    // release() drains and releases.
    let (mut response, feeder) = connected(&tracker);
    assert_eq!(outstanding_connections(), base + 1);
    feeder.feed_eof();
    response.release().await;
    assert_eq!(outstanding_connections(), base);

    // close() destroys.
    let (mut response, _feeder) = connected(&tracker);
    assert_eq!(outstanding_connections(), base + 1);
    response.close();
    assert_eq!(outstanding_connections(), base);

    // Dropping a holder closes and records a leak.
    let (response, _feeder) = connected(&tracker);
    let (second, _second_feeder) = connected(&tracker);
    assert_eq!(outstanding_connections(), base + 2);
    drop(response);
    assert_eq!(outstanding_connections(), base + 1);
    drop(second);
    assert_eq!(outstanding_connections(), base);
    assert_eq!(leaked_responses(), leaked_before + 2);

    // A rejected second setup does not count.
    let (mut response, _feeder) = connected(&tracker);
    assert!(response.setup(tracker.handle()).is_err());
    assert_eq!(outstanding_connections(), base + 1);
    response.close();
    assert_eq!(outstanding_connections(), base);

    assert_eq!(tracker.released(), 2);
    assert_eq!(tracker.closed(), 5);
}
