//! Integration tests for the wire codec with captured feed frames.

use tape_core::{CurrencyPair, TradeSide, TradeSource};
use tape_ws::{Envelope, EventKind, SubscriptionRequest, Topic, WsError};

/// Subscribe request for the BTC/USD trade channel, exactly as sent on the wire.
#[test]
fn test_subscribe_request_wire_format() {
    let channel = Topic::LiveTrades.channel(&CurrencyPair::btc_usd());
    let text = SubscriptionRequest::subscribe(channel).encode().unwrap();

    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "event": "bts:subscribe",
            "data": {"channel": "live_trades_btcusd"}
        })
    );
}

#[test]
fn test_unsubscribe_request_wire_format() {
    let text = SubscriptionRequest::unsubscribe("order_book_etheur")
        .encode()
        .unwrap();
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["event"], "bts:unsubscribe");
    assert_eq!(value["data"]["channel"], "order_book_etheur");
}

/// Live trade frame with string-encoded numbers.
#[test]
fn test_live_trade_frame_to_trade() {
    let raw = r#"{
        "data": {
            "buy_order_id": 1275184523112448,
            "amount_str": "0.01000000",
            "timestamp": "1600786463",
            "microtimestamp": "1600786463523000",
            "id": 123456789,
            "amount": 0.01,
            "sell_order_id": 1275184520192000,
            "price_str": "10460.33",
            "type": 1,
            "price": 10460.33
        },
        "event": "trade",
        "channel": "live_trades_btcusd"
    }"#;

    let envelope = Envelope::from_text(raw).unwrap();
    assert_eq!(envelope.kind(), EventKind::Trade);

    let payload = envelope.live_trade().unwrap();
    assert_eq!(payload.buy_order_id, Some(1275184523112448));
    assert_eq!(payload.sell_order_id, Some(1275184520192000));

    let trade = payload.into_trade().unwrap();
    assert_eq!(trade.id, 123456789);
    assert_eq!(trade.side, TradeSide::Sell);
    assert_eq!(trade.source, TradeSource::Live);
    assert_eq!(trade.price, 10460.33);
    assert_eq!(trade.timestamp.timestamp(), 1600786463);
    assert_eq!(trade.timestamp.timestamp_subsec_micros(), 523000);
}

/// Control frames carry an empty object (or nothing) as payload.
#[test]
fn test_control_frames() {
    let ack = Envelope::from_text(
        r#"{"event":"bts:subscription_succeeded","channel":"live_trades_btcusd","data":{}}"#,
    )
    .unwrap();
    assert_eq!(ack.kind(), EventKind::SubscriptionSucceeded);
    assert_eq!(ack.payload(), "{}");

    let reconnect =
        Envelope::from_text(r#"{"event":"bts:request_reconnect","channel":"","data":""}"#)
            .unwrap();
    assert_eq!(reconnect.kind(), EventKind::RequestReconnect);

    let missing = Envelope::from_text(r#"{"event":"bts:error","channel":""}"#).unwrap();
    assert_eq!(missing.kind(), EventKind::Error);
    assert_eq!(missing.payload(), "null");
}

/// A trade payload on a non-trade event is rejected without touching the envelope.
#[test]
fn test_payload_shape_mismatch() {
    let envelope = Envelope::from_text(
        r#"{"event":"data","channel":"order_book_btcusd","data":{"bids":[],"asks":[]}}"#,
    )
    .unwrap();
    assert!(matches!(envelope.live_trade(), Err(WsError::Decode(_))));
    assert_eq!(envelope.channel(), "order_book_btcusd");
}

#[test]
fn test_malformed_frames() {
    assert!(matches!(
        Envelope::from_text("{\"event\":\"trade\""),
        Err(WsError::Decode(_))
    ));
    assert!(matches!(
        Envelope::from_text(r#"{"data":{}}"#),
        Err(WsError::Decode(_))
    ));
}
