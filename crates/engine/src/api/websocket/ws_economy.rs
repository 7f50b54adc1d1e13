//! Banking, wealth, and merchant trade.
//!
//! Coin words resolve through the declarative currency table, so prose
//! echoes always carry real catalogue names. Denomination conversion is a
//! greedy split over the table (largest coins first).

use driftmere_domain::{ConnectionId, CurrencyTable, PlayerId, RoomKind};
use driftmere_shared::{MerchantEntry, ServerMessage};

use crate::api::frames;
use crate::infrastructure::ports::{MerchantItem, RepoError};

use super::{error_response, ws_warehouse, Quantity, WsState};

// =============================================================================
// Bank
// =============================================================================

pub(super) async fn handle_deposit(
    state: &WsState,
    connection_id: ConnectionId,
    currency_name: &str,
    quantity_raw: &str,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;
    if !in_room_kind(state, &session, RoomKind::Bank).await {
        return Some(error_response("There is no bank here"));
    }

    let wallet = match app.repos.currency.player_currency(session.player_id).await {
        Ok(wallet) => wallet,
        Err(_) => return Some(error_response("The bank is unavailable")),
    };
    let Some(denom) = app
        .currency_table
        .resolve(currency_name, |name| held_of(&wallet, name))
        .cloned()
    else {
        return Some(error_response(&format!(
            "You don't have any {currency_name}"
        )));
    };

    let held = held_of(&wallet, &denom.item_name);
    let quantity = match Quantity::parse(Some(quantity_raw)) {
        Ok(q) => q,
        Err(e) => return Some(e),
    };
    let amount = quantity.resolve(held);
    if amount == 0 || held == 0 {
        return Some(error_response(&format!(
            "You don't have any {} to deposit",
            denom.item_name
        )));
    }
    if amount > held {
        return Some(error_response(&format!(
            "You only have {held} {}",
            denom.item_name
        )));
    }

    if let Err(e) = app
        .repos
        .currency
        .deposit_currency(session.player_id, &denom.item_name, amount)
        .await
    {
        tracing::error!(error = %e, "Deposit failed");
        return Some(error_response("The clerk fumbles the coins; try again"));
    }

    frames::send_player_stats(state, connection_id).await;
    let balance = balance_line(state, session.player_id).await;
    Some(ServerMessage::Message {
        message: format!(
            "You deposit {amount} {}. {balance}",
            denom.item_name
        ),
        html: None,
    })
}

/// Bank or warehouse withdraw, decided by the room kind.
pub(super) async fn handle_withdraw(
    state: &WsState,
    connection_id: ConnectionId,
    item_name: Option<&str>,
    currency_name: Option<&str>,
    quantity_raw: Option<&str>,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let room = state
        .app
        .repos
        .world
        .room_by_id(session.room_id)
        .await
        .ok()
        .flatten()?;
    match room.kind {
        RoomKind::Bank => {
            let Some(currency_name) = currency_name.or(item_name) else {
                return Some(error_response("Withdraw what?"));
            };
            withdraw_from_bank(state, connection_id, currency_name, quantity_raw).await
        }
        RoomKind::Warehouse => {
            let Some(item_name) = item_name else {
                return Some(error_response("Withdraw what?"));
            };
            ws_warehouse::handle_withdraw_item(state, connection_id, item_name, quantity_raw).await
        }
        _ => Some(error_response("There is nothing to withdraw from here")),
    }
}

async fn withdraw_from_bank(
    state: &WsState,
    connection_id: ConnectionId,
    currency_name: &str,
    quantity_raw: Option<&str>,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;

    let balance = match app.repos.currency.bank_balance(session.player_id).await {
        Ok(balance) => balance,
        Err(_) => return Some(error_response("The bank is unavailable")),
    };
    let Some(denom) = app
        .currency_table
        .resolve(currency_name, |name| held_of(&balance, name))
        .cloned()
    else {
        return Some(error_response(&format!(
            "Your account holds no {currency_name}"
        )));
    };

    let held = held_of(&balance, &denom.item_name);
    let quantity = match Quantity::parse(quantity_raw) {
        Ok(q) => q,
        Err(e) => return Some(e),
    };
    let amount = quantity.resolve(held);
    if amount == 0 || held == 0 {
        return Some(error_response(&format!(
            "Your account holds no {}",
            denom.item_name
        )));
    }
    if amount > held {
        return Some(error_response(&format!(
            "Your account only holds {held} {}",
            denom.item_name
        )));
    }

    if let Err(e) = app
        .repos
        .currency
        .withdraw_currency(session.player_id, &denom.item_name, amount)
        .await
    {
        tracing::error!(error = %e, "Withdraw failed");
        return Some(error_response("The clerk fumbles the coins; try again"));
    }

    frames::send_player_stats(state, connection_id).await;
    let balance = balance_line(state, session.player_id).await;
    Some(ServerMessage::Message {
        message: format!("You withdraw {amount} {}. {balance}", denom.item_name),
        html: None,
    })
}

pub(super) async fn handle_balance(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    if !in_room_kind(state, &session, RoomKind::Bank).await {
        return Some(error_response("There is no bank here"));
    }
    let line = balance_line(state, session.player_id).await;
    Some(ServerMessage::Message {
        message: line,
        html: None,
    })
}

pub(super) async fn handle_wealth(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;
    let wallet = app
        .repos
        .currency
        .player_currency(session.player_id)
        .await
        .unwrap_or_default();
    let bank = app
        .repos
        .currency
        .bank_balance(session.player_id)
        .await
        .unwrap_or_default();
    let total = app.currency_table.total_value(&wallet) + app.currency_table.total_value(&bank);
    let unit = app
        .currency_table
        .smallest()
        .map(|d| d.item_name.clone())
        .unwrap_or_else(|| "coin".to_string());
    Some(ServerMessage::Message {
        message: format!("Counting wallet and bank, you are worth {total} {unit}s."),
        html: None,
    })
}

async fn balance_line(state: &WsState, player_id: PlayerId) -> String {
    let balance = state
        .app
        .repos
        .currency
        .bank_balance(player_id)
        .await
        .unwrap_or_default();
    if balance.iter().all(|(_, qty)| *qty == 0) {
        return "Your account is empty.".to_string();
    }
    let parts: Vec<String> = balance
        .iter()
        .filter(|(_, qty)| *qty > 0)
        .map(|(name, qty)| format!("{qty} {name}"))
        .collect();
    format!("Bank balance: {}.", parts.join(", "))
}

// =============================================================================
// Merchant
// =============================================================================

pub(super) async fn handle_list(
    state: &WsState,
    connection_id: ConnectionId,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    if !in_room_kind(state, &session, RoomKind::Merchant).await {
        return Some(error_response("There is no merchant here"));
    }
    let stock = match state
        .app
        .repos
        .merchant
        .items_for_room(session.room_id)
        .await
    {
        Ok(stock) => stock,
        Err(_) => return Some(error_response("The merchant is busy")),
    };
    Some(ServerMessage::MerchantList {
        items: stock
            .into_iter()
            .map(|item| MerchantEntry {
                name: item.item_name,
                price: item.price,
                stock: item.stock,
                buyable: item.buyable,
                sellable: item.sellable,
            })
            .collect(),
    })
}

pub(super) async fn handle_buy(
    state: &WsState,
    connection_id: ConnectionId,
    item_name: &str,
    quantity: Option<u32>,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;
    if !in_room_kind(state, &session, RoomKind::Merchant).await {
        return Some(error_response("There is no merchant here"));
    }
    let quantity = quantity.unwrap_or(1).max(1);

    let stock = match app.repos.merchant.items_for_room(session.room_id).await {
        Ok(stock) => stock,
        Err(_) => return Some(error_response("The merchant is busy")),
    };
    let entry = match match_merchant_item(&stock, item_name, |i| i.buyable) {
        Ok(entry) => entry,
        Err(response) => return Some(response),
    };

    if let Some(available) = entry.stock {
        if available < quantity {
            return Some(error_response(&format!(
                "The merchant only has {available} {}",
                entry.item_name
            )));
        }
    }

    let cost = entry.price * i64::from(quantity);
    let wallet = app
        .repos
        .currency
        .player_currency(session.player_id)
        .await
        .unwrap_or_default();
    let funds = app.currency_table.total_value(&wallet);
    if funds < cost {
        return Some(error_response(&format!(
            "You cannot afford that ({cost} needed, {funds} held)"
        )));
    }

    if let Err(e) = debit(app, session.player_id, &wallet, cost).await {
        tracing::error!(error = %e, "Currency debit failed");
        return Some(error_response("The merchant cannot make change"));
    }
    if let Err(e) = app
        .repos
        .item
        .add_player_item(session.player_id, &entry.item_name, quantity)
        .await
    {
        tracing::error!(error = %e, "Failed to credit purchase");
        return Some(error_response("The purchase failed"));
    }
    if let Some(available) = entry.stock {
        let _ = app
            .repos
            .merchant
            .update_stock(session.room_id, &entry.item_name, available - quantity)
            .await;
    }

    frames::send_player_stats(state, connection_id).await;
    let unit = smallest_unit(&app.currency_table);
    Some(ServerMessage::Message {
        message: format!(
            "You buy {quantity} {} for {cost} {unit}s.",
            entry.item_name
        ),
        html: None,
    })
}

pub(super) async fn handle_sell(
    state: &WsState,
    connection_id: ConnectionId,
    item_name: &str,
    quantity: Option<u32>,
) -> Option<ServerMessage> {
    let session = state.registry.get(connection_id).await?;
    let app = &state.app;
    if !in_room_kind(state, &session, RoomKind::Merchant).await {
        return Some(error_response("There is no merchant here"));
    }
    let quantity = quantity.unwrap_or(1).max(1);

    let inventory = app
        .repos
        .item
        .player_items(session.player_id)
        .await
        .unwrap_or_default();
    let needle = item_name.trim().to_lowercase();
    let matches: Vec<_> = inventory
        .iter()
        .filter(|i| i.item_name.to_lowercase().contains(&needle))
        .collect();
    let held = match matches.len() {
        0 => return Some(error_response(&format!("You don't have a {item_name}"))),
        1 => matches[0],
        _ => {
            let names: Vec<String> = matches.iter().map(|i| i.item_name.clone()).collect();
            return Some(error_response(&format!(
                "Which do you mean: {}?",
                names.join(", ")
            )));
        }
    };
    if held.quantity < quantity {
        return Some(error_response(&format!(
            "You only have {} {}",
            held.quantity, held.item_name
        )));
    }

    let stock = app
        .repos
        .merchant
        .items_for_room(session.room_id)
        .await
        .unwrap_or_default();
    let entry = stock
        .iter()
        .find(|i| i.item_name.eq_ignore_ascii_case(&held.item_name));
    let Some(entry) = entry.filter(|e| e.sellable && e.price > 0) else {
        return Some(error_response(&format!(
            "The merchant has no interest in your {}",
            held.item_name
        )));
    };

    let item_name = held.item_name.clone();
    let proceeds = entry.price * i64::from(quantity);
    if let Err(e) = app
        .repos
        .item
        .remove_player_item(session.player_id, &item_name, quantity)
        .await
    {
        tracing::error!(error = %e, "Failed to take sold item");
        return Some(error_response("The sale failed"));
    }
    if let Err(e) = credit(app, session.player_id, proceeds).await {
        tracing::error!(error = %e, "Failed to pay for sale");
        let _ = app
            .repos
            .item
            .add_player_item(session.player_id, &item_name, quantity)
            .await;
        return Some(error_response("The sale failed"));
    }
    if let Some(available) = entry.stock {
        let _ = app
            .repos
            .merchant
            .update_stock(session.room_id, &item_name, available + quantity)
            .await;
    }

    frames::send_player_stats(state, connection_id).await;
    let unit = smallest_unit(&app.currency_table);
    Some(ServerMessage::Message {
        message: format!("You sell {quantity} {item_name} for {proceeds} {unit}s."),
        html: None,
    })
}

// =============================================================================
// Helpers
// =============================================================================

async fn in_room_kind(
    state: &WsState,
    session: &crate::api::session_state::SessionInfo,
    kind: RoomKind,
) -> bool {
    state
        .app
        .repos
        .world
        .room_by_id(session.room_id)
        .await
        .ok()
        .flatten()
        .is_some_and(|room| room.kind == kind)
}

fn held_of(holdings: &[(String, u32)], name: &str) -> u32 {
    holdings
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map_or(0, |(_, qty)| *qty)
}

fn smallest_unit(table: &CurrencyTable) -> String {
    table
        .smallest()
        .map(|d| d.item_name.clone())
        .unwrap_or_else(|| "coin".to_string())
}

/// Greedy change-making over the denomination table.
pub(super) fn optimal_split(table: &CurrencyTable, mut amount: i64) -> Vec<(String, u32)> {
    let mut split = Vec::new();
    for denom in table.denominations() {
        if denom.value <= 0 || amount < denom.value {
            continue;
        }
        let count = amount / denom.value;
        amount -= count * denom.value;
        split.push((denom.item_name.clone(), count as u32));
    }
    split
}

/// Take `cost` out of the wallet, returning change in optimal coins. This
/// is where denomination auto-conversion happens.
async fn debit(
    app: &crate::app::App,
    player_id: PlayerId,
    wallet: &[(String, u32)],
    cost: i64,
) -> Result<(), RepoError> {
    for (name, qty) in wallet {
        if *qty > 0 {
            app.repos
                .currency
                .remove_player_currency(player_id, name, *qty)
                .await?;
        }
    }
    let change = app.currency_table.total_value(wallet) - cost;
    for (name, qty) in optimal_split(&app.currency_table, change) {
        app.repos
            .currency
            .add_player_currency(player_id, &name, qty)
            .await?;
    }
    Ok(())
}

/// Pay out `amount` in optimal coins.
async fn credit(
    app: &crate::app::App,
    player_id: PlayerId,
    amount: i64,
) -> Result<(), RepoError> {
    for (name, qty) in optimal_split(&app.currency_table, amount) {
        app.repos
            .currency
            .add_player_currency(player_id, &name, qty)
            .await?;
    }
    Ok(())
}

/// Partial-name match over merchant stock with the given filter.
fn match_merchant_item<'a, F>(
    stock: &'a [MerchantItem],
    item_name: &str,
    filter: F,
) -> Result<&'a MerchantItem, ServerMessage>
where
    F: Fn(&MerchantItem) -> bool,
{
    let needle = item_name.trim().to_lowercase();
    let matches: Vec<&MerchantItem> = stock
        .iter()
        .filter(|i| filter(i) && i.item_name.to_lowercase().contains(&needle))
        .collect();
    match matches.len() {
        0 => Err(error_response(&format!("{item_name} is not for sale"))),
        1 => Ok(matches[0]),
        _ => {
            let names: Vec<String> = matches.iter().map(|i| i.item_name.clone()).collect();
            Err(error_response(&format!(
                "Which do you mean: {}?",
                names.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftmere_domain::{ItemDefinition, ItemId, ItemKind};

    fn table() -> CurrencyTable {
        CurrencyTable::from_items(&[
            ItemDefinition {
                id: ItemId::new(),
                name: "Glimmer Crown".to_string(),
                kind: ItemKind::Currency,
                encumbrance: 0.01,
                poofable: false,
                warehouse_key: None,
                currency_value: Some(100),
            },
            ItemDefinition {
                id: ItemId::new(),
                name: "Glimmer Shard".to_string(),
                kind: ItemKind::Currency,
                encumbrance: 0.01,
                poofable: false,
                warehouse_key: None,
                currency_value: Some(1),
            },
        ])
    }

    #[test]
    fn optimal_split_prefers_large_coins() {
        let split = optimal_split(&table(), 342);
        assert_eq!(
            split,
            vec![
                ("Glimmer Crown".to_string(), 3),
                ("Glimmer Shard".to_string(), 42),
            ]
        );
    }

    #[test]
    fn optimal_split_of_zero_is_empty() {
        assert!(optimal_split(&table(), 0).is_empty());
    }

    #[test]
    fn merchant_matching_disambiguates() {
        let stock = vec![
            MerchantItem {
                item_name: "Iron Pick".to_string(),
                price: 40,
                stock: Some(2),
                buyable: true,
                sellable: true,
            },
            MerchantItem {
                item_name: "Iron Kettle".to_string(),
                price: 15,
                stock: None,
                buyable: true,
                sellable: false,
            },
        ];
        assert!(match_merchant_item(&stock, "pick", |i| i.buyable).is_ok());
        assert!(match_merchant_item(&stock, "iron", |i| i.buyable).is_err());
        assert!(match_merchant_item(&stock, "kettle", |i| i.sellable).is_err());
    }
}
