//! Admin notification for new reservations.
//!
//! The mailer is a broadcast subscriber: it never sits on the booking path,
//! and a failed send is logged and counted but never reported to the customer.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::dates::format_date;
use crate::engine::Engine;
use crate::model::{Car, Event, Reservation};
use crate::observability;

pub const RESERVATION_SUBJECT: &str = "New Car Reservation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Delivery backend for admin messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &Message) -> Result<(), NotifyError>;
}

/// Writes messages to the log instead of a mail server.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &Message) -> Result<(), NotifyError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "notification: {}",
            message.html
        );
        Ok(())
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn reservation_message(reservation: &Reservation, car: &Car, from: &str, to: &str) -> Message {
    let html = format!(
        "<h2>New Reservation Details</h2>\n\
         <p><strong>Customer:</strong> {} ({})</p>\n\
         <p><strong>Car:</strong> {} {}</p>\n\
         <p><strong>Dates:</strong> {} to {}</p>\n\
         <p><strong>Total Price:</strong> ${:.2}</p>\n\
         <p>Please log in to the admin panel to confirm this reservation.</p>\n",
        escape_html(&reservation.customer_name),
        escape_html(&reservation.customer_email),
        escape_html(&car.name),
        escape_html(&car.model),
        format_date(reservation.range.start),
        format_date(reservation.range.end),
        reservation.total_price,
    );
    Message {
        from: from.to_string(),
        to: to.to_string(),
        subject: RESERVATION_SUBJECT.to_string(),
        html,
    }
}

/// Addresses used for admin notifications.
#[derive(Debug, Clone)]
pub struct MailRoute {
    pub from: String,
    pub to: String,
}

/// Consume engine events and notify the admin of each new reservation.
/// Returns once the event channel closes.
pub async fn run_mailer(
    engine: Arc<Engine>,
    mut rx: broadcast::Receiver<Event>,
    notifier: Arc<dyn Notifier>,
    route: MailRoute,
) {
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("mailer lagged, {skipped} events dropped");
                metrics::counter!(observability::NOTIFICATIONS_FAILED_TOTAL).increment(skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Event::ReservationCreated { reservation } = event else {
            continue;
        };
        notify_reservation(&engine, notifier.as_ref(), &route, &reservation).await;
    }
    debug!("mailer stopped");
}

async fn notify_reservation(
    engine: &Engine,
    notifier: &dyn Notifier,
    route: &MailRoute,
    reservation: &Reservation,
) {
    let car = match engine.get_car(reservation.car_id).await {
        Ok(car) => car,
        Err(e) => {
            warn!("no notification for reservation {}: {e}", reservation.id);
            metrics::counter!(observability::NOTIFICATIONS_FAILED_TOTAL).increment(1);
            return;
        }
    };

    let message = reservation_message(reservation, &car, &route.from, &route.to);
    match notifier.send(&message).await {
        Ok(()) => {
            metrics::counter!(observability::NOTIFICATIONS_SENT_TOTAL).increment(1);
            debug!("reservation {} notification sent", reservation.id);
        }
        Err(e) => {
            metrics::counter!(observability::NOTIFICATIONS_FAILED_TOTAL).increment(1);
            warn!("reservation {}: {e}", reservation.id);
        }
    }
}
