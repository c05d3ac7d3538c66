//! Receipt polling.
//!
//! A receipt becomes available some time after a node accepts a
//! transaction. Until then the node answers with a "not yet" status, which
//! the engine treats as a retry without penalizing the node.

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::execute::{Execute, ExecutionState};
use crate::ids::{AccountId, TransactionId};
use crate::status::Status;
use crate::wire::{self, Receipt, ReceiptRequest, ReceiptResponse};
use tracing::debug;

/// Query for the receipt of one transaction.
#[derive(Debug, Clone)]
pub struct ReceiptQuery {
    transaction_id: TransactionId,
    node_ids: Option<Vec<AccountId>>,
}

impl ReceiptQuery {
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            transaction_id,
            node_ids: None,
        }
    }

    /// Ask only `node_id` instead of the healthiest node in the pool.
    pub fn with_node(mut self, node_id: AccountId) -> Self {
        self.node_ids = Some(vec![node_id]);
        self
    }

    /// Fetch the receipt, whatever its status.
    pub async fn execute(&self, client: &Client) -> Result<Receipt> {
        client.execute(self).await
    }
}

impl Execute for ReceiptQuery {
    type Response = ReceiptResponse;
    type Output = Receipt;

    fn method(&self) -> &'static str {
        wire::METHOD_GET_RECEIPT
    }

    fn node_ids(&self) -> Option<&[AccountId]> {
        self.node_ids.as_deref()
    }

    fn transaction_id(&self) -> Option<&TransactionId> {
        Some(&self.transaction_id)
    }

    fn make_request(&self, _node_id: &AccountId) -> Result<Vec<u8>> {
        wire::encode(&ReceiptRequest {
            transaction_id: self.transaction_id.clone(),
        })
    }

    fn read_response(&self, bytes: &[u8]) -> Result<ReceiptResponse> {
        wire::decode(bytes)
    }

    fn response_status(&self, response: &ReceiptResponse) -> Status {
        response.status
    }

    fn should_retry(&self, status: Status, response: &ReceiptResponse) -> ExecutionState {
        match status {
            Status::Busy
            | Status::Unknown
            | Status::ReceiptNotFound
            | Status::RecordNotFound
            | Status::PlatformNotActive => return ExecutionState::Retry,
            Status::Ok => {}
            _ => return ExecutionState::RequestError,
        }

        // The query succeeded; the receipt may still be pending.
        let receipt_status = response.receipt.as_ref().map_or(Status::Unknown, |r| r.status);
        match receipt_status {
            Status::Unknown | Status::Ok | Status::Busy | Status::ReceiptNotFound | Status::RecordNotFound => {
                ExecutionState::Retry
            }
            _ => ExecutionState::Success,
        }
    }

    fn map_response(&self, response: ReceiptResponse, _node_id: &AccountId) -> Result<Receipt> {
        response
            .receipt
            .ok_or_else(|| ClientError::Internal("receipt response without a receipt".into()))
    }
}

/// Poll the receipt of `transaction_id` and require a `SUCCESS` outcome.
pub async fn get_receipt(
    client: &Client,
    transaction_id: &TransactionId,
    node_id: Option<&AccountId>,
) -> Result<Receipt> {
    let mut query = ReceiptQuery::new(transaction_id.clone());
    if let Some(node_id) = node_id {
        query = query.with_node(node_id.clone());
    }

    let receipt = query.execute(client).await?;
    debug!(transaction_id = %transaction_id, status = %receipt.status, "Received receipt");
    if receipt.status != Status::Success {
        return Err(ClientError::ReceiptStatus {
            status: receipt.status,
            transaction_id: transaction_id.clone(),
        });
    }
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Timestamp;

    fn query() -> ReceiptQuery {
        ReceiptQuery::new(TransactionId::new(AccountId::new("0.0.2"), Timestamp::new(5, 0)))
    }

    fn response(status: Status, receipt: Option<Status>) -> ReceiptResponse {
        ReceiptResponse {
            status,
            receipt: receipt.map(|status| Receipt { status }),
        }
    }

    fn decide(status: Status, receipt: Option<Status>) -> ExecutionState {
        query().should_retry(status, &response(status, receipt))
    }

    #[test]
    fn test_header_not_ready_retries() {
        for status in [Status::Busy, Status::Unknown, Status::ReceiptNotFound, Status::RecordNotFound] {
            assert_eq!(decide(status, None), ExecutionState::Retry, "{}", status);
        }
    }

    #[test]
    fn test_receipt_pending_retries() {
        for status in [Status::Unknown, Status::Ok, Status::Busy, Status::ReceiptNotFound] {
            assert_eq!(decide(Status::Ok, Some(status)), ExecutionState::Retry, "{}", status);
        }
        assert_eq!(decide(Status::Ok, None), ExecutionState::Retry);
    }

    #[test]
    fn test_final_receipt_is_success() {
        assert_eq!(decide(Status::Ok, Some(Status::Success)), ExecutionState::Success);
        // a failed outcome is still a final receipt
        assert_eq!(decide(Status::Ok, Some(Status::FailInvalid)), ExecutionState::Success);
    }

    #[test]
    fn test_header_error_is_request_error() {
        assert_eq!(decide(Status::InvalidTransactionId, None), ExecutionState::RequestError);
    }

    #[test]
    fn test_bound_to_node() {
        let q = query().with_node(AccountId::new("0.0.4"));
        assert_eq!(q.node_ids(), Some(&[AccountId::new("0.0.4")][..]));
        assert!(query().node_ids().is_none());
    }

    #[test]
    fn test_request_carries_transaction_id() {
        let q = query();
        let bytes = q.make_request(&AccountId::new("0.0.3")).unwrap();
        let request: ReceiptRequest = wire::decode(&bytes).unwrap();
        assert_eq!(&request.transaction_id, q.transaction_id().unwrap());
    }
}
