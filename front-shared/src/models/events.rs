use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeOutcome {
    Committed,
    Aborted,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub number: u32,
    pub user_id: Uuid,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct PaymentItemAddedEvent {
    pub order_id: Uuid,
    pub payment_item_id: Uuid,
    pub payment_type_id: Uuid,
    pub amount: i64,
    pub is_preliminary: bool,
    pub is_external: bool,
    pub is_donation: bool,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct PaymentItemDeletedEvent {
    pub order_id: Uuid,
    pub payment_item_id: Uuid,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct PrepayProcessedEvent {
    pub order_id: Uuid,
    pub payment_item_id: Uuid,
    pub amount: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct OrderPaidEvent {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub result_sum: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct CafeSessionChangedEvent {
    pub session_id: Uuid,
    pub is_open: bool,
    pub user_id: Uuid,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct ScopeFinishedEvent {
    pub scope_id: Uuid,
    pub outcome: ScopeOutcome,
    pub locked_entities: usize,
    pub elapsed_ms: u64,
}

/// Everything the store announces after a change became visible
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrontEvent {
    OrderCreated(OrderCreatedEvent),
    PaymentItemAdded(PaymentItemAddedEvent),
    PaymentItemDeleted(PaymentItemDeletedEvent),
    PrepayProcessed(PrepayProcessedEvent),
    OrderPaid(OrderPaidEvent),
    CafeSessionChanged(CafeSessionChangedEvent),
    ScopeFinished(ScopeFinishedEvent),
}

impl FrontEvent {
    /// Topic name, used as the log target and by subscribers that filter
    pub fn topic(&self) -> &'static str {
        match self {
            FrontEvent::OrderCreated(_) => "orders.created",
            FrontEvent::PaymentItemAdded(_) => "payments.added",
            FrontEvent::PaymentItemDeleted(_) => "payments.deleted",
            FrontEvent::PrepayProcessed(_) => "payments.prepaid",
            FrontEvent::OrderPaid(_) => "orders.paid",
            FrontEvent::CafeSessionChanged(_) => "cafe.session",
            FrontEvent::ScopeFinished(_) => "operations.scope",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_is_tagged() {
        let event = FrontEvent::OrderPaid(OrderPaidEvent {
            order_id: Uuid::nil(),
            user_id: Uuid::nil(),
            result_sum: 4200,
            timestamp: 0,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ORDER_PAID");
        assert_eq!(json["result_sum"], 4200);
        assert_eq!(event.topic(), "orders.paid");
    }
}
