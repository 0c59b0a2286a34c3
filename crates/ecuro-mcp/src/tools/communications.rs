use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{EcuroRoute, tool};
use crate::{
    handler::server::{
        tool::{Parameters, ToolOutcome, ToolOutput, ToolRoute},
        validation::{Validate, Violations},
    },
    model::ToolAnnotations,
    upstream::UpstreamClient,
};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MarkCommunicationRead {
    /// Communication ID (UUID)
    #[schemars(extend("format" = "uuid"))]
    pub communication_id: String,
}

impl Validate for MarkCommunicationRead {
    fn validate(&self, violations: &mut Violations) {
        violations.uuid("communicationId", &self.communication_id);
    }
}

pub async fn mark_communication_read(
    client: Arc<UpstreamClient>,
    Parameters(args): Parameters<MarkCommunicationRead>,
) -> ToolOutcome {
    let path = format!("/communications/{}/read", args.communication_id);
    Ok(ToolOutput::Json(client.put::<()>(&path, None).await?))
}

pub fn routes() -> Vec<EcuroRoute> {
    vec![ToolRoute::new(
        tool::<MarkCommunicationRead>(
            "ecuro_mark_communication_read",
            "Mark Communication as Read",
            "Flag a patient communication (message or notification) as read.",
            ToolAnnotations::writes(true),
        ),
        mark_communication_read,
    )]
}
