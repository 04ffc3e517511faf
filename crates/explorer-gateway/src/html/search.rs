//! Free-text search: the first kind of object the query names wins.

use super::views::{location, View};
use crate::state::SharedState;
use explorer_types::{AccountDetails, AddressFilter, ApiError, ApiResult};

/// Try the query as an xpub, a block, a transaction and an address, in
/// that order, and redirect to the first hit.
pub async fn search(state: &SharedState, query: &str) -> ApiResult<View> {
    let q = query.trim();
    if !q.is_empty() {
        let accounts = &state.backends.accounts;
        let filter = AddressFilter::default();
        if state.backends.codec.capabilities().supports_xpub
            && accounts
                .get_xpub_address(q, 1, 1, AccountDetails::Basic, &filter, 0)
                .await
                .is_ok()
        {
            return Ok(View::Redirect(location("xpub", q)));
        }
        if let Ok(block) = accounts.get_block(q, 1, 1).await {
            return Ok(View::Redirect(location("block", &block.info.hash)));
        }
        if let Ok(tx) = accounts.get_transaction(q, false, false).await {
            return Ok(View::Redirect(location("tx", &tx.txid)));
        }
        if let Ok(address) = accounts
            .get_address(q, 1, 1, AccountDetails::Basic, &filter)
            .await
        {
            return Ok(View::Redirect(location("address", &address.address)));
        }
    }
    Err(ApiError::public(format!("No matching records found for '{}'", q)))
}
