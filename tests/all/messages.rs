use crate::helpers::delivery;
use amqp_kit::consumers::{BrokerAction, DeliveryHandler};
use amqp_kit::messages::hooks::NeverRequeue;
use amqp_kit::messages::{HandlerError, Incoming};
use serde::Deserialize;

#[derive(Deserialize)]
struct Transfer {
    amount: i64,
}

async fn transfer(message: Incoming<Transfer>) -> Result<(), HandlerError> {
    if message.payload.amount < 0 {
        return Err(HandlerError::fatal(anyhow::anyhow!("negative amount")));
    }
    if message.payload.amount > 1_000 {
        return Err(anyhow::anyhow!("the ledger is busy").into());
    }
    Ok(())
}

#[tokio::test]
async fn default_and_generic_pipelines_disagree_on_first_transient_failures() {
    let big_transfer = br#"{"amount": 5000}"#;

    let default = amqp_kit::default_parse_and_handle_message(transfer);
    let generic = amqp_kit::parse_and_handle_message(
        amqp_kit::parse_json_message::<Transfer>,
        transfer,
        NeverRequeue,
    );

    assert_eq!(default.handle(&delivery(big_transfer, false)).await, BrokerAction::Nack);
    assert_eq!(generic.handle(&delivery(big_transfer, false)).await, BrokerAction::Reject);
}

#[tokio::test]
async fn both_pipelines_agree_on_success_and_fatal_failures() {
    let default = amqp_kit::default_parse_and_handle_message(transfer);
    let generic = amqp_kit::parse_and_handle_message(
        amqp_kit::parse_json_message::<Transfer>,
        transfer,
        NeverRequeue,
    );

    for (body, expected) in [
        (&br#"{"amount": 10}"#[..], BrokerAction::Ack),
        (&br#"{"amount": -10}"#[..], BrokerAction::Reject),
        (&b"[]"[..], BrokerAction::Reject),
    ] {
        assert_eq!(default.handle(&delivery(body, false)).await, expected);
        assert_eq!(generic.handle(&delivery(body, false)).await, expected);
    }
}
