//! Explorer pages. Each view either fills a template or redirects.

use super::format::{escape_html, escape_path_segment, format_amount_span, format_int64, time_span};
use super::paging::get_paging_range;
use crate::rest::QueryParams;
use crate::state::SharedState;
use explorer_types::{AccountDetails, AddressView, Amount, ApiError, ApiResult, ChainType, Paging, Tx};
use std::collections::HashMap;
use std::fmt::Write;

/// Outcome of an explorer handler.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    Page {
        template: &'static str,
        title: String,
        slots: Vec<(&'static str, String)>,
    },
    /// 302 to a site-relative location
    Redirect(String),
}

impl View {
    fn page(template: &'static str, title: impl Into<String>, slots: Vec<(&'static str, String)>) -> Self {
        View::Page {
            template,
            title: title.into(),
            slots,
        }
    }
}

/// `/{kind}/{id}`, with `id` percent-encoded.
pub fn location(kind: &str, id: &str) -> String {
    format!("/{}/{}", kind, escape_path_segment(id))
}

fn link(kind: &str, id: &str) -> String {
    format!(r#"<a href="{}">{}</a>"#, location(kind, id), escape_html(id))
}

fn row(label: &str, value: impl AsRef<str>) -> String {
    format!("<tr><td>{}</td><td>{}</td></tr>", label, value.as_ref())
}

/// Amount rendering of the connected chain.
#[derive(Debug, Clone, Copy)]
struct Amounts {
    decimals: u32,
    chain: ChainType,
}

impl Amounts {
    fn of(state: &SharedState) -> Self {
        Self {
            decimals: state.backends.codec.amount_decimals(),
            chain: state.backends.codec.chain_type(),
        }
    }

    fn span(&self, amount: &Amount) -> String {
        format_amount_span(amount, self.decimals, self.chain, "", "")
    }

    fn opt(&self, amount: Option<&Amount>) -> String {
        self.span(amount.unwrap_or(&Amount::ZERO))
    }
}

/// Pager links for `base`; empty when there is a single page.
pub fn pager(base: &str, paging: Paging) -> String {
    let (pages, prev, next) = get_paging_range(paging.page, paging.total_pages);
    if pages.is_empty() {
        return String::new();
    }
    let mut out = String::from(r#"<nav class="paging">"#);
    let _ = write!(out, r#"<a href="{}?page={}">&lt;</a>"#, base, prev);
    for p in pages {
        if p == 0 {
            out.push_str("<span>...</span>");
        } else if p == paging.page {
            let _ = write!(out, "<span><b>{}</b></span>", p);
        } else {
            let _ = write!(out, r#"<a href="{}?page={}">{}</a>"#, base, p, p);
        }
    }
    let _ = write!(out, r#"<a href="{}?page={}">&gt;</a></nav>"#, base, next);
    out
}

fn address_links(addresses: &[String], is_address: bool) -> String {
    if addresses.is_empty() {
        return "Unparsed address".to_string();
    }
    addresses
        .iter()
        .map(|a| if is_address { link("address", a) } else { escape_html(a) })
        .collect::<Vec<_>>()
        .join("<br>")
}

/// One table row per transaction of an address or block listing.
fn tx_rows(txs: &[Tx], amounts: Amounts) -> String {
    let mut out = String::new();
    for tx in txs {
        let when = if tx.block_height > 0 {
            time_span(tx.block_time)
        } else {
            "Unconfirmed".to_string()
        };
        out.push_str(&format!(
            "<tr><td class=\"mono\">{}</td><td>{}</td><td>{}</td></tr>",
            link("tx", &tx.txid),
            when,
            amounts.span(&tx.value)
        ));
    }
    out
}

fn txid_rows(txids: &[String]) -> String {
    txids
        .iter()
        .map(|t| format!("<tr><td class=\"mono\">{}</td></tr>", link("tx", t)))
        .collect()
}

pub async fn index(state: &SharedState) -> ApiResult<View> {
    let info = state.backends.accounts.get_system_info(false).await?;
    let ix = &info.blockbook;
    let be = &info.backend;
    let indexer = [
        row("Coin", escape_html(&ix.coin)),
        row("Host", escape_html(&ix.host)),
        row("Version", escape_html(&ix.version)),
        row(
            "Last Block",
            format!(
                r#"<a href="/block/{}">{}</a>"#,
                ix.best_height,
                format_int64(ix.best_height.into())
            ),
        ),
        row("Last Block Update", time_span(ix.last_block_time)),
        row("In Sync", ix.in_sync.to_string()),
        row("Mempool in Sync", ix.in_sync_mempool.to_string()),
        row("Transactions in Mempool", format_int64(ix.mempool_size.into())),
        row("Decimals", ix.decimals.to_string()),
        row("About", escape_html(&ix.about)),
    ]
    .concat();
    let backend = [
        row("Chain", escape_html(&be.chain)),
        row("Version", escape_html(&be.version)),
        row("Subversion", escape_html(&be.subversion)),
        row("Blocks", format_int64(be.blocks.into())),
        row("Headers", format_int64(be.headers.into())),
        row("Best Block Hash", link("block", &be.best_block_hash)),
    ]
    .concat();
    let ticker = match state.backends.rates.current_ticker() {
        Some(t) if !t.rates.is_empty() => {
            let mut out = format!("<p>Updated {}</p><table>", time_span(t.timestamp));
            for (currency, rate) in &t.rates {
                out.push_str(&row(&escape_html(&currency.to_uppercase()), rate.to_string()));
            }
            out.push_str("</table>");
            out
        }
        _ => "<p>No fiat rates available</p>".to_string(),
    };
    Ok(View::page(
        "index",
        format!("{} Explorer", ix.coin),
        vec![
            ("coin", escape_html(&ix.coin)),
            ("indexer", indexer),
            ("backend", backend),
            ("ticker", ticker),
        ],
    ))
}

pub async fn tx(state: &SharedState, txid: &str) -> ApiResult<View> {
    let tx = state.backends.accounts.get_transaction(txid, false, false).await?;
    let amounts = Amounts::of(state);

    let block = if tx.block_height > 0 {
        format!(
            r#"<a href="{}">{}</a>"#,
            location("block", &tx.block_hash),
            format_int64(tx.block_height)
        )
    } else {
        "Unconfirmed".to_string()
    };
    let mut summary = vec![
        row("Block", block),
        row("Confirmations", format_int64(tx.confirmations.into())),
        row("Time", time_span(tx.block_time)),
    ];
    if tx.size > 0 {
        summary.push(row("Size", format_int64(tx.size.into())));
    }
    summary.push(row("Total Output", amounts.span(&tx.value)));
    if let Some(v) = &tx.value_in {
        summary.push(row("Total Input", amounts.span(v)));
    }
    if let Some(f) = &tx.fees {
        summary.push(row("Fees", amounts.span(f)));
    }

    let mut inputs = String::new();
    if tx.vin.iter().all(|v| !v.coinbase.is_empty()) && !tx.vin.is_empty() {
        inputs.push_str("<tr><td>No Inputs (Newly Generated Coins)</td><td></td></tr>");
    } else {
        for vin in &tx.vin {
            let source = if vin.txid.is_empty() {
                String::new()
            } else {
                format!(r#" <a href="{}">&#8594;</a>"#, location("tx", &vin.txid))
            };
            let _ = write!(
                inputs,
                "<tr><td>{}{}</td><td>{}</td></tr>",
                address_links(&vin.addresses, vin.is_address),
                source,
                amounts.opt(vin.value.as_ref())
            );
        }
    }

    let mut outputs = String::new();
    for vout in &tx.vout {
        let spent = if vout.spent {
            format!(
                r#"<a href="/spending/{}/{}">Spent</a>"#,
                escape_path_segment(&tx.txid),
                vout.n
            )
        } else {
            "Unspent".to_string()
        };
        let _ = write!(
            outputs,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            address_links(&vout.addresses, vout.is_address),
            amounts.opt(vout.value.as_ref()),
            spent
        );
    }

    Ok(View::page(
        "tx",
        format!("Transaction {}", tx.txid),
        vec![
            ("txid", escape_html(&tx.txid)),
            ("summary", summary.concat()),
            ("inputs", inputs),
            ("outputs", outputs),
        ],
    ))
}

/// Redirect to the transaction spending output `vout` of `txid`.
pub async fn spending(state: &SharedState, txid: &str, vout: &str) -> ApiResult<View> {
    let not_found = || ApiError::public("Transaction not found");
    let vout: u32 = vout.parse().map_err(|_| not_found())?;
    let spending = state.backends.accounts.get_spending_txid(txid, vout).await?;
    if spending.is_empty() {
        return Err(not_found());
    }
    Ok(View::Redirect(location("tx", &spending)))
}

fn address_page(heading: &str, base: &str, view: &AddressView, amounts: Amounts) -> View {
    let mut summary = vec![
        row("Balance", amounts.span(&view.balance)),
        row("Transactions", format_int64(view.txs.into())),
    ];
    if let Some(r) = &view.total_received {
        summary.push(row("Total Received", amounts.span(r)));
    }
    if let Some(s) = &view.total_sent {
        summary.push(row("Total Sent", amounts.span(s)));
    }
    if view.unconfirmed_txs > 0 {
        summary.push(row("Unconfirmed Balance", amounts.span(&view.unconfirmed_balance)));
        summary.push(row(
            "Unconfirmed Transactions",
            format_int64(view.unconfirmed_txs.into()),
        ));
    }
    let txs = if view.transactions.is_empty() {
        txid_rows(&view.txids)
    } else {
        tx_rows(&view.transactions, amounts)
    };
    View::page(
        "address",
        format!("{} {}", heading, view.address),
        vec![
            ("heading", heading.to_string()),
            ("address", escape_html(&view.address)),
            ("summary", summary.concat()),
            ("txs", txs),
            ("pager", pager(base, view.paging)),
        ],
    )
}

pub async fn address(state: &SharedState, address: &str, q: &QueryParams) -> ApiResult<View> {
    let view = state
        .backends
        .accounts
        .get_address(
            address,
            q.page(),
            state.config.limits.txs_on_page,
            AccountDetails::Txs,
            &q.address_filter(),
        )
        .await?;
    Ok(address_page(
        "Address",
        &location("address", address),
        &view,
        Amounts::of(state),
    ))
}

pub async fn xpub(state: &SharedState, xpub: &str, q: &QueryParams) -> ApiResult<View> {
    let view = state
        .backends
        .accounts
        .get_xpub_address(
            xpub,
            q.page(),
            state.config.limits.txs_on_page,
            AccountDetails::Txs,
            &q.address_filter(),
            q.u32_or_zero("gap"),
        )
        .await?;
    Ok(address_page("XPUB", &location("xpub", xpub), &view, Amounts::of(state)))
}

pub async fn block(state: &SharedState, id: &str, q: &QueryParams) -> ApiResult<View> {
    let block = state
        .backends
        .accounts
        .get_block(id, q.page(), state.config.limits.txs_on_page)
        .await?;
    let info = &block.info;
    let mut summary = vec![
        row("Transactions", format_int64(info.tx_count.into())),
        row("Height", format_int64(info.height.into())),
        row("Confirmations", format_int64(info.confirmations.into())),
        row("Timestamp", time_span(info.time)),
        row("Size (bytes)", format_int64(info.size.into())),
    ];
    if !info.previous_block_hash.is_empty() {
        summary.push(row("Previous Block", link("block", &info.previous_block_hash)));
    }
    if !info.next_block_hash.is_empty() {
        summary.push(row("Next Block", link("block", &info.next_block_hash)));
    }
    if !info.merkle_root.is_empty() {
        summary.push(row("Merkle Root", escape_html(&info.merkle_root)));
    }
    Ok(View::page(
        "block",
        format!("Block {}", info.height),
        vec![
            ("height", info.height.to_string()),
            ("hash", escape_html(&info.hash)),
            ("summary", summary.concat()),
            ("txs", tx_rows(&block.txs, Amounts::of(state))),
            ("pager", pager(&location("block", &info.hash), block.paging)),
        ],
    ))
}

pub async fn blocks(state: &SharedState, q: &QueryParams) -> ApiResult<View> {
    let blocks = state
        .backends
        .accounts
        .get_blocks(q.page(), state.config.limits.blocks_on_page)
        .await?;
    let rows = blocks
        .blocks
        .iter()
        .map(|b| {
            format!(
                "<tr><td><a href=\"/block/{}\">{}</a></td><td class=\"mono\">{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                b.height,
                b.height,
                link("block", &b.hash),
                time_span(b.time),
                format_int64(b.tx_count.into()),
                format_int64(b.size.into())
            )
        })
        .collect::<String>();
    Ok(View::page(
        "blocks",
        "Blocks",
        vec![("rows", rows), ("pager", pager("/blocks", blocks.paging))],
    ))
}

pub async fn mempool(state: &SharedState, q: &QueryParams) -> ApiResult<View> {
    let mempool = state
        .backends
        .accounts
        .get_mempool(q.page(), state.config.limits.mempool_txs_on_page)
        .await?;
    let rows = mempool
        .mempool
        .iter()
        .map(|m| {
            format!(
                "<tr><td class=\"mono\">{}</td><td>{}</td></tr>",
                link("tx", &m.txid),
                time_span(m.time)
            )
        })
        .collect::<String>();
    Ok(View::page(
        "mempool",
        "Mempool",
        vec![
            ("size", format_int64(mempool.mempool_size.into())),
            ("rows", rows),
            ("pager", pager("/mempool", mempool.paging)),
        ],
    ))
}

/// The send form; a posted `hex` is broadcast and the outcome shown on
/// the same page with status 200 either way.
pub async fn send_tx(state: &SharedState, form: Option<HashMap<String, String>>) -> ApiResult<View> {
    let mut hex = String::new();
    let mut status = String::new();
    let mut error = String::new();
    let posted = form
        .as_ref()
        .and_then(|f| f.get("hex"))
        .map(|h| h.trim().to_string())
        .unwrap_or_default();
    if !posted.is_empty() {
        match state.backends.chain.send_raw_transaction(&posted).await {
            Ok(txid) => {
                status = format!(
                    r#"<p class="status">{}</p>"#,
                    escape_html(&format!("Transaction sent, result {}", txid))
                );
            }
            Err(e) => {
                error = format!(r#"<p class="error">{}</p>"#, escape_html(&e.message));
                hex = escape_html(&posted);
            }
        }
    }
    Ok(View::page(
        "sendtx",
        "Send Transaction",
        vec![("hex", hex), ("status", status), ("error", error)],
    ))
}
