//! Integration tests for the Session Controller, driven entirely through a mock transport.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use mqtt_session::control_packet::{
    ConnectReturnCode, Packet, QoS, SubscribeReasonCode,
};
use mqtt_session::error::SessionErrorKind;
use mqtt_session::interface::Event;
use mqtt_session::interface_mocks::{MockTransport, MockTransportHandle};
use mqtt_session::session::{OutgoingMessage, Session};
use mqtt_session::{MqttClientOptions, MqttClientOptionsBuilder};

fn options() -> MqttClientOptions {
    MqttClientOptionsBuilder::default()
        .client_id("test-client")
        .default_communication_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn new_session() -> (
    Session<MockTransport>,
    MockTransportHandle,
    mpsc::UnboundedReceiver<Event>,
) {
    let (transport, handle) = MockTransport::new();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let session = Session::new(transport, options(), events_tx);
    (session, handle, events_rx)
}

async fn connect(
    session: &Session<MockTransport>,
    handle: &mut MockTransportHandle,
) {
    let connect_task = tokio::spawn({
        let session = session.clone();
        async move { session.connect(None).await }
    });

    match handle.outbound_rx.recv().await {
        Some(Packet::Connect { .. }) => {}
        other => panic!("expected CONNECT, got {other:?}"),
    }

    handle
        .inbound_tx
        .send(Packet::ConnAck {
            session_present: false,
            return_code: ConnectReturnCode::ConnectionAccepted,
        })
        .unwrap();

    connect_task.await.unwrap().expect("connect should succeed");
}

#[tokio::test]
async fn connect_accepted_transitions_to_connected() {
    let (session, mut handle, mut events_rx) = new_session();
    connect(&session, &mut handle).await;
    assert!(session.is_connected());
    assert!(matches!(events_rx.recv().await, Some(Event::Connected)));
}

#[tokio::test]
async fn connect_refused_fails_with_connecting_failed_and_stays_disconnected() {
    let (session, mut handle, _events_rx) = new_session();

    let connect_task = tokio::spawn({
        let session = session.clone();
        async move { session.connect(None).await }
    });

    handle.outbound_rx.recv().await.unwrap();
    handle
        .inbound_tx
        .send(Packet::ConnAck {
            session_present: false,
            return_code: ConnectReturnCode::BadUserNameOrPassword,
        })
        .unwrap();

    let result = connect_task.await.unwrap();
    assert_eq!(
        result.unwrap_err().kind(),
        &SessionErrorKind::ConnectingFailed(ConnectReturnCode::BadUserNameOrPassword)
    );
    assert!(!session.is_connected());
}

#[tokio::test]
async fn second_connect_while_connected_is_a_protocol_violation() {
    let (session, mut handle, _events_rx) = new_session();
    connect(&session, &mut handle).await;

    let result = session.connect(None).await;
    assert!(matches!(
        result.unwrap_err().kind(),
        SessionErrorKind::ProtocolViolation(_)
    ));
}

#[tokio::test]
async fn operations_fail_with_not_connected_before_connecting() {
    let (session, _handle, _events_rx) = new_session();

    let publish_result = session
        .publish(OutgoingMessage {
            topic: "a/b".to_string(),
            payload: Bytes::from_static(b"hi"),
            qos: QoS::AtMostOnce,
            retain: false,
        })
        .await;
    assert_eq!(publish_result.unwrap_err().kind(), &SessionErrorKind::NotConnected);

    let disconnect_result = session.disconnect().await;
    assert_eq!(
        disconnect_result.unwrap_err().kind(),
        &SessionErrorKind::NotConnected
    );
}

#[tokio::test]
async fn publish_qos0_does_not_wait_for_a_response() {
    let (session, mut handle, _events_rx) = new_session();
    connect(&session, &mut handle).await;

    session
        .publish(OutgoingMessage {
            topic: "a/b".to_string(),
            payload: Bytes::from_static(b"hi"),
            qos: QoS::AtMostOnce,
            retain: false,
        })
        .await
        .unwrap();

    match handle.outbound_rx.recv().await {
        Some(Packet::Publish(publish)) => {
            assert_eq!(publish.qos, QoS::AtMostOnce);
            assert_eq!(publish.topic, "a/b");
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    }
}

#[tokio::test]
async fn publish_qos1_completes_after_puback() {
    let (session, mut handle, _events_rx) = new_session();
    connect(&session, &mut handle).await;

    let publish_task = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .publish(OutgoingMessage {
                    topic: "a/b".to_string(),
                    payload: Bytes::from_static(b"hi"),
                    qos: QoS::AtLeastOnce,
                    retain: false,
                })
                .await
        }
    });

    let packet_id = match handle.outbound_rx.recv().await {
        Some(Packet::Publish(publish)) => {
            assert_eq!(publish.qos, QoS::AtLeastOnce);
            publish.packet_id
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    };

    handle
        .inbound_tx
        .send(Packet::PubAck { packet_id })
        .unwrap();

    publish_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn publish_qos2_completes_with_pubcomp_after_pubrec() {
    let (session, mut handle, _events_rx) = new_session();
    connect(&session, &mut handle).await;

    let publish_task = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .publish(OutgoingMessage {
                    topic: "a/b".to_string(),
                    payload: Bytes::from_static(b"hi"),
                    qos: QoS::ExactlyOnce,
                    retain: false,
                })
                .await
        }
    });

    let packet_id = match handle.outbound_rx.recv().await {
        Some(Packet::Publish(publish)) => {
            assert_eq!(publish.qos, QoS::ExactlyOnce);
            publish.packet_id
        }
        other => panic!("expected PUBLISH, got {other:?}"),
    };

    handle
        .inbound_tx
        .send(Packet::PubRec { packet_id })
        .unwrap();

    match handle.outbound_rx.recv().await {
        Some(Packet::PubComp { packet_id: id }) => assert_eq!(id, packet_id),
        other => panic!("expected PUBCOMP, got {other:?}"),
    }

    publish_task.await.unwrap().unwrap();
}

#[tokio::test]
async fn subscribe_rejects_an_empty_filter_list() {
    let (session, mut handle, _events_rx) = new_session();
    connect(&session, &mut handle).await;

    let result = session.subscribe(Vec::new()).await;
    assert!(matches!(
        result.unwrap_err().kind(),
        SessionErrorKind::ProtocolViolation(_)
    ));
}

#[tokio::test]
async fn subscribe_returns_one_outcome_per_filter() {
    let (session, mut handle, _events_rx) = new_session();
    connect(&session, &mut handle).await;

    let subscribe_task = tokio::spawn({
        let session = session.clone();
        async move {
            session
                .subscribe(vec![("a/b".to_string(), QoS::AtLeastOnce)])
                .await
        }
    });

    let packet_id = match handle.outbound_rx.recv().await {
        Some(Packet::Subscribe { packet_id, filters }) => {
            assert_eq!(filters, vec![("a/b".to_string(), QoS::AtLeastOnce)]);
            packet_id
        }
        other => panic!("expected SUBSCRIBE, got {other:?}"),
    };

    handle
        .inbound_tx
        .send(Packet::SubAck {
            packet_id,
            return_codes: vec![SubscribeReasonCode::GrantedQoS(QoS::AtLeastOnce)],
        })
        .unwrap();

    let outcomes = subscribe_task.await.unwrap().unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].filter, "a/b");
    assert_eq!(
        outcomes[0].return_code,
        SubscribeReasonCode::GrantedQoS(QoS::AtLeastOnce)
    );
}

#[tokio::test]
async fn inbound_qos1_publish_is_acked_and_delivered() {
    let (session, mut handle, mut events_rx) = new_session();
    connect(&session, &mut handle).await;
    assert!(matches!(events_rx.recv().await, Some(Event::Connected)));

    handle
        .inbound_tx
        .send(Packet::Publish(mqtt_session::control_packet::Publish {
            packet_id: 9,
            topic: "c/d".to_string(),
            payload: Bytes::from_static(b"payload"),
            qos: QoS::AtLeastOnce,
            dup: false,
            retain: false,
        }))
        .unwrap();

    match handle.outbound_rx.recv().await {
        Some(Packet::PubAck { packet_id }) => assert_eq!(packet_id, 9),
        other => panic!("expected PUBACK, got {other:?}"),
    }

    match events_rx.recv().await {
        Some(Event::ApplicationMessageReceived(message)) => {
            assert_eq!(message.topic, "c/d");
            assert_eq!(message.payload, Bytes::from_static(b"payload"));
        }
        other => panic!("expected an application message event, got {other:?}"),
    }
}

#[tokio::test]
async fn inbound_qos2_publish_delivers_once_pubrel_arrives() {
    let (session, mut handle, mut events_rx) = new_session();
    connect(&session, &mut handle).await;
    assert!(matches!(events_rx.recv().await, Some(Event::Connected)));

    handle
        .inbound_tx
        .send(Packet::Publish(mqtt_session::control_packet::Publish {
            packet_id: 11,
            topic: "e/f".to_string(),
            payload: Bytes::from_static(b"payload"),
            qos: QoS::ExactlyOnce,
            dup: false,
            retain: false,
        }))
        .unwrap();

    match handle.outbound_rx.recv().await {
        Some(Packet::PubRec { packet_id }) => assert_eq!(packet_id, 11),
        other => panic!("expected PUBREC, got {other:?}"),
    }

    handle
        .inbound_tx
        .send(Packet::PubRel { packet_id: 11 })
        .unwrap();

    match handle.outbound_rx.recv().await {
        Some(Packet::PubComp { packet_id }) => assert_eq!(packet_id, 11),
        other => panic!("expected PUBCOMP, got {other:?}"),
    }

    match events_rx.recv().await {
        Some(Event::ApplicationMessageReceived(message)) => assert_eq!(message.topic, "e/f"),
        other => panic!("expected an application message event, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_emits_disconnected_event_and_is_idempotent() {
    let (session, mut handle, mut events_rx) = new_session();
    connect(&session, &mut handle).await;
    assert!(matches!(events_rx.recv().await, Some(Event::Connected)));

    session.disconnect().await.unwrap();
    assert!(matches!(
        handle.outbound_rx.recv().await,
        Some(Packet::Disconnect)
    ));
    assert!(matches!(events_rx.recv().await, Some(Event::Disconnected)));
    assert!(!session.is_connected());

    let result = session.disconnect().await;
    assert_eq!(result.unwrap_err().kind(), &SessionErrorKind::NotConnected);
}
