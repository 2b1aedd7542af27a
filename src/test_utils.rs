use crate::consumers::Delivery;
use lapin::{acker::Acker, BasicProperties};

/// A first delivery of `data`, not bound to any channel.
pub(crate) fn delivery(data: &[u8]) -> Delivery {
    Delivery {
        delivery_tag: 1,
        exchange: "".into(),
        routing_key: "".into(),
        redelivered: false,
        properties: BasicProperties::default(),
        data: data.to_vec(),
        acker: Acker::default(),
    }
}

/// Same as [`delivery`], as if the broker already delivered it before.
pub(crate) fn redelivered(data: &[u8]) -> Delivery {
    Delivery {
        redelivered: true,
        ..delivery(data)
    }
}
