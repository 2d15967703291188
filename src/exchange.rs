use crate::split::ContributorSplit;
use serde::Serialize;

#[derive(Clone, Debug)]
struct PersonalBalance {
    name: String,
    balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Exchange {
    pub payer: String,
    pub receiver: String,
    pub amount: f64,
}

// Anything under half a cent is rounding noise, not money owed
const SETTLED_EPSILON: f64 = 0.005;

fn round_to_2_decimals(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

/// Pairs the largest debtor with the largest creditor until everyone is even.
fn get_simplified_exchanges(
    mut payers: Vec<PersonalBalance>,
    mut receivers: Vec<PersonalBalance>,
) -> Vec<Exchange> {
    payers.sort_by(|a, b| a.balance.total_cmp(&b.balance));
    receivers.sort_by(|a, b| a.balance.total_cmp(&b.balance));

    let mut exchanges = Vec::new();

    while let (Some(payer), Some(receiver)) = (payers.last_mut(), receivers.last_mut()) {
        let amount = payer.balance.min(receiver.balance);
        exchanges.push(Exchange {
            payer: payer.name.clone(),
            receiver: receiver.name.clone(),
            amount: round_to_2_decimals(amount),
        });
        payer.balance = round_to_2_decimals(payer.balance - amount);
        receiver.balance = round_to_2_decimals(receiver.balance - amount);

        if payer.balance < SETTLED_EPSILON {
            payers.pop();
        }
        if receiver.balance < SETTLED_EPSILON {
            receivers.pop();
        }
        // Popping can leave the tail out of order
        payers.sort_by(|a, b| a.balance.total_cmp(&b.balance));
        receivers.sort_by(|a, b| a.balance.total_cmp(&b.balance));
    }
    exchanges
}

/// Turns a bill split into the transfers that settle it: contributors who
/// paid less than their share pay those who paid more.
pub fn get_exchanges_from_split(split: &[ContributorSplit]) -> Vec<Exchange> {
    let mut payers = Vec::new();
    let mut receivers = Vec::new();

    for entry in split {
        let balance = round_to_2_decimals(entry.balance);
        if balance.abs() < SETTLED_EPSILON {
            continue;
        }
        let person = PersonalBalance {
            name: entry.name.clone(),
            balance: balance.abs(),
        };
        if balance < 0.0 {
            payers.push(person);
        } else {
            receivers.push(person);
        }
    }

    get_simplified_exchanges(payers, receivers)
        .into_iter()
        .filter(|exchange| exchange.amount >= SETTLED_EPSILON)
        .collect()
}
