/*!
 * Billing
 * Checkout sessions and the subscription changes reported by webhooks
 */
pub mod stripe;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::rules::plans::{BillingCycle, Plan, ALL_PLANS};
use stripe::WebhookEvent;

/// Catalogue entry returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOffer {
    pub plan: Plan,
    pub monthly_price_cents: i64,
    pub yearly_price_cents: i64,
    pub project_limit: Option<i64>,
    pub custom_domain: bool,
}

pub fn catalogue() -> Vec<PlanOffer> {
    ALL_PLANS
        .iter()
        .map(|plan| PlanOffer {
            plan: *plan,
            monthly_price_cents: plan.price_cents(BillingCycle::Monthly),
            yearly_price_cents: plan.price_cents(BillingCycle::Yearly),
            project_limit: plan.project_limit(),
            custom_domain: plan.allows_custom_domain(),
        })
        .collect()
}

/// Profile update implied by a webhook event.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionChange {
    Activated {
        profile_id: Uuid,
        plan: Plan,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        promo_code_id: Option<Uuid>,
    },
    Updated {
        subscription_id: String,
        status: String,
        current_period_end: Option<DateTime<Utc>>,
    },
    Canceled {
        subscription_id: String,
    },
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Maps a provider event to a profile change. Unhandled events give `None`.
pub fn subscription_change(event: &WebhookEvent) -> Option<SubscriptionChange> {
    let object = &event.data.object;
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let profile_id = str_at(object, "/metadata/profile_id")
                .or_else(|| str_at(object, "/client_reference_id"))
                .and_then(|s| Uuid::parse_str(s).ok())?;
            let plan = str_at(object, "/metadata/plan")?.parse::<Plan>().ok()?;
            Some(SubscriptionChange::Activated {
                profile_id,
                plan,
                customer_id: str_at(object, "/customer").map(str::to_string),
                subscription_id: str_at(object, "/subscription").map(str::to_string),
                promo_code_id: str_at(object, "/metadata/promo_code_id")
                    .and_then(|s| Uuid::parse_str(s).ok()),
            })
        }
        "customer.subscription.updated" => Some(SubscriptionChange::Updated {
            subscription_id: str_at(object, "/id")?.to_string(),
            status: str_at(object, "/status").unwrap_or("active").to_string(),
            current_period_end: object
                .pointer("/current_period_end")
                .and_then(Value::as_i64)
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
        }),
        "customer.subscription.deleted" => Some(SubscriptionChange::Canceled {
            subscription_id: str_at(object, "/id")?.to_string(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, object: Value) -> WebhookEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn test_catalogue_lists_all_plans() {
        let plans = catalogue();
        assert_eq!(plans.len(), 3);
        assert_eq!(plans[1].plan, Plan::Pro);
        assert_eq!(plans[1].monthly_price_cents, 900);
        assert!(plans[2].custom_domain);
    }

    #[test]
    fn test_checkout_completed() {
        let profile = Uuid::new_v4();
        let promo = Uuid::new_v4();
        let change = subscription_change(&event(
            "checkout.session.completed",
            json!({
                "id": "cs_1",
                "customer": "cus_9",
                "subscription": "sub_9",
                "client_reference_id": profile.to_string(),
                "metadata": { "plan": "premium", "promo_code_id": promo.to_string() }
            }),
        ));
        assert_eq!(
            change,
            Some(SubscriptionChange::Activated {
                profile_id: profile,
                plan: Plan::Premium,
                customer_id: Some("cus_9".to_string()),
                subscription_id: Some("sub_9".to_string()),
                promo_code_id: Some(promo),
            })
        );
    }

    #[test]
    fn test_checkout_without_metadata_is_ignored() {
        let change = subscription_change(&event(
            "checkout.session.completed",
            json!({ "id": "cs_1", "metadata": {} }),
        ));
        assert_eq!(change, None);
    }

    #[test]
    fn test_subscription_updated_and_deleted() {
        let updated = subscription_change(&event(
            "customer.subscription.updated",
            json!({ "id": "sub_1", "status": "past_due", "current_period_end": 1_735_689_600 }),
        ))
        .unwrap();
        match updated {
            SubscriptionChange::Updated {
                subscription_id,
                status,
                current_period_end,
            } => {
                assert_eq!(subscription_id, "sub_1");
                assert_eq!(status, "past_due");
                assert_eq!(current_period_end.unwrap().timestamp(), 1_735_689_600);
            }
            other => panic!("unexpected change: {other:?}"),
        }

        assert_eq!(
            subscription_change(&event("customer.subscription.deleted", json!({ "id": "sub_1" }))),
            Some(SubscriptionChange::Canceled {
                subscription_id: "sub_1".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_event() {
        assert_eq!(
            subscription_change(&event("invoice.paid", json!({ "id": "in_1" }))),
            None
        );
    }
}
