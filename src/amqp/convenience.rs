use lapin::{types::AMQPValue, BasicProperties};
use std::borrow::{Borrow, Cow};

/// Convenience methods for [`lapin::BasicProperties`].
pub trait BasicPropertiesExt {
    /// Lookup header by key.
    fn get_header<Q>(&self, key: &Q) -> Option<&AMQPValue>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized;

    /// Lookup a header string value.
    ///
    /// Returns `None` if not a string.
    fn get_header_str<Q>(&self, key: &Q) -> Option<Cow<'_, str>>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        match self.get_header(key) {
            Some(AMQPValue::LongString(s)) => Some(String::from_utf8_lossy(s.as_bytes())),
            Some(AMQPValue::ShortString(s)) => Some(Cow::Borrowed(s.as_str())),
            _ => None,
        }
    }
}

impl BasicPropertiesExt for BasicProperties {
    fn get_header<Q>(&self, key: &Q) -> Option<&AMQPValue>
    where
        lapin::types::ShortString: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.headers().as_ref()?.inner().get(key)
    }
}

/// Set the value for a header inside a collection of AMQP properties.
///
/// `lapin` does not give mutable access to headers, so they are cloned. `properties` is
/// consumed to make sure the caller does not keep using the stale collection.
///
/// # Example
///
/// ```rust
/// use amqp_kit::amqp::types::AMQPValue;
/// use amqp_kit::amqp::{BasicProperties, convenience::{set_header, BasicPropertiesExt}};
///
/// let properties = set_header(
///     BasicProperties::default(),
///     "x-tenant",
///     AMQPValue::LongString("acme".into()),
/// );
///
/// assert_eq!(properties.get_header_str("x-tenant").as_deref(), Some("acme"));
/// ```
pub fn set_header(
    properties: BasicProperties,
    header_name: &str,
    header_value: AMQPValue,
) -> BasicProperties {
    let mut headers = properties.headers().clone().unwrap_or_default();
    headers.insert(header_name.into(), header_value);
    properties.with_headers(headers)
}
