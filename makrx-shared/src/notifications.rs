/// Notification templates
///
/// Each [`NotificationKind`] has a built-in title and body written with
/// `{{name}}` placeholders. Rendering substitutes every placeholder from a
/// string map:
///
/// - a placeholder without a value is an error
/// - an unterminated `{{` is copied verbatim
///
/// # Example
///
/// ```
/// use makrx_shared::notifications::{render, NotificationKind};
/// use std::collections::HashMap;
///
/// let mut vars = HashMap::new();
/// vars.insert("name".to_string(), "Ada".to_string());
/// assert_eq!(render("Hi {{name}}!", &vars).unwrap(), "Hi Ada!");
///
/// assert!(NotificationKind::LowStock.render(&vars).is_err());
/// ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::notification::NotificationPriority;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("Missing template variable: {0}")]
    MissingVariable(String),
}

/// Built-in notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    LowStock,
    ReservationConfirmed,
    ReservationCancelled,
    ServiceOrderUpdate,
    OrderStatus,
    EventRegistration,
    SystemAnnouncement,
}

/// Title and body after substitution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedNotification {
    pub title: String,
    pub body: String,
}

impl NotificationKind {
    /// Stored in `notifications.kind`
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::LowStock => "low_stock",
            NotificationKind::ReservationConfirmed => "reservation_confirmed",
            NotificationKind::ReservationCancelled => "reservation_cancelled",
            NotificationKind::ServiceOrderUpdate => "service_order_update",
            NotificationKind::OrderStatus => "order_status",
            NotificationKind::EventRegistration => "event_registration",
            NotificationKind::SystemAnnouncement => "system_announcement",
        }
    }

    /// `(title, body)` templates
    pub fn templates(&self) -> (&'static str, &'static str) {
        match self {
            NotificationKind::LowStock => (
                "Low stock: {{item_name}}",
                "{{item_name}} is down to {{quantity}} {{unit}} (threshold {{threshold}}).",
            ),
            NotificationKind::ReservationConfirmed => (
                "Reservation confirmed",
                "Your reservation of {{equipment_name}} from {{starts_at}} to {{ends_at}} is confirmed.",
            ),
            NotificationKind::ReservationCancelled => (
                "Reservation cancelled",
                "Your reservation of {{equipment_name}} starting {{starts_at}} was cancelled.",
            ),
            NotificationKind::ServiceOrderUpdate => (
                "Service order update",
                "Your {{service_type}} order {{order_id}} is now {{status}}.",
            ),
            NotificationKind::OrderStatus => (
                "Order {{order_number}} {{status}}",
                "Your order {{order_number}} is now {{status}}.",
            ),
            NotificationKind::EventRegistration => (
                "Registered for {{event_title}}",
                "You are registered for {{event_title}} starting {{starts_at}}.",
            ),
            NotificationKind::SystemAnnouncement => ("{{title}}", "{{message}}"),
        }
    }

    pub fn default_priority(&self) -> NotificationPriority {
        match self {
            NotificationKind::LowStock | NotificationKind::ReservationCancelled => {
                NotificationPriority::High
            }
            _ => NotificationPriority::Normal,
        }
    }

    pub fn render(&self, vars: &HashMap<String, String>) -> Result<RenderedNotification, TemplateError> {
        let (title, body) = self.templates();
        Ok(RenderedNotification {
            title: render(title, vars)?,
            body: render(body, vars)?,
        })
    }
}

/// Substitutes `{{name}}` placeholders
///
/// Whitespace inside the braces is ignored (`{{ name }}`).
pub fn render(template: &str, vars: &HashMap<String, String>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let name = after_open[..end].trim();
        let value = vars
            .get(name)
            .ok_or_else(|| TemplateError::MissingVariable(name.to_string()))?;
        out.push_str(value);

        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_all() {
        let v = vars(&[("a", "1"), ("b", "2")]);
        assert_eq!(render("{{a}}+{{ b }}={{a}}{{b}}", &v).unwrap(), "1+2=12");
    }

    #[test]
    fn test_render_missing_variable() {
        assert_eq!(
            render("Hello {{who}}", &HashMap::new()),
            Err(TemplateError::MissingVariable("who".to_string()))
        );
    }

    #[test]
    fn test_render_unterminated_is_verbatim() {
        let v = vars(&[("a", "x")]);
        assert_eq!(render("{{a}} and {{broken", &v).unwrap(), "x and {{broken");
        assert_eq!(render("no placeholders", &v).unwrap(), "no placeholders");
    }

    #[test]
    fn test_low_stock_template() {
        let v = vars(&[
            ("item_name", "PLA filament"),
            ("quantity", "2"),
            ("unit", "spools"),
            ("threshold", "5"),
        ]);
        let rendered = NotificationKind::LowStock.render(&v).unwrap();
        assert_eq!(rendered.title, "Low stock: PLA filament");
        assert_eq!(rendered.body, "PLA filament is down to 2 spools (threshold 5).");
    }

    #[test]
    fn test_kind_serde_matches_as_str() {
        for kind in [
            NotificationKind::LowStock,
            NotificationKind::ReservationConfirmed,
            NotificationKind::ReservationCancelled,
            NotificationKind::ServiceOrderUpdate,
            NotificationKind::OrderStatus,
            NotificationKind::EventRegistration,
            NotificationKind::SystemAnnouncement,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
