use crate::consumers::Delivery;
use crate::messages::ParseError;
use serde::de::DeserializeOwned;

/// Decode the body of a message as JSON.
///
/// ```rust
/// # fn example(delivery: &amqp_kit::consumers::Delivery) -> Result<(), amqp_kit::messages::ParseError> {
/// #[derive(serde::Deserialize)]
/// struct PaymentCreated {
///     id: String,
///     amount: u64,
/// }
///
/// let payment: PaymentCreated = amqp_kit::parse_json_message(delivery)?;
/// # Ok(())
/// # }
/// ```
pub fn parse_json_message<T: DeserializeOwned>(delivery: &Delivery) -> Result<T, ParseError> {
    if delivery.data.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::EmptyBody);
    }
    Ok(serde_json::from_slice(&delivery.data)?)
}
