//! Concrete tool handlers, grouped by category.

pub mod admin;
pub mod erp;
pub mod kg;
pub mod notif;

use std::sync::Arc;

use crate::erp_client::ErpClient;
use crate::registry::ToolDefinition;
use admin::TicketStore;

/// Builds the full set of tools installed into the registry at startup.
#[must_use]
pub fn build_all(erp: Arc<ErpClient>) -> Vec<ToolDefinition> {
    let tickets = TicketStore::new();
    vec![
        erp::account_status_tool(Arc::clone(&erp)),
        erp::payment_link_tool(Arc::clone(&erp)),
        erp::record_payment_claim_tool(erp),
        admin::create_ticket_tool(tickets.clone()),
        admin::lookup_ticket_tool(tickets),
        admin::classify_priority_tool(),
        kg::hours_tool(),
        kg::calendar_tool(),
        kg::authorities_tool(),
        kg::contact_tool(),
        kg::general_info_tool(),
        notif::send_notification_tool(),
    ]
}
