//! Core type definitions

use ruint::aliases::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Chain denomination of a token (e.g. `uosmo`, `ibc/27394F...`)
pub type Denom = String;

/// On-chain pool identifier
pub type PoolId = u64;

/// Block height
pub type Height = u64;

/// Raw token amount with its denom
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: Denom,
    #[serde(with = "amount_serde")]
    pub amount: U256,
}

impl Coin {
    pub fn new(denom: impl Into<Denom>, amount: U256) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    pub fn from_u128(denom: impl Into<Denom>, amount: u128) -> Self {
        Self::new(denom, U256::from(amount))
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Canonical coin set: one entry per denom, sorted by denom.
///
/// Duplicate denoms are summed on construction, so two `Coins` built from the
/// same multiset of coins iterate identically regardless of input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Coin>", into = "Vec<Coin>")]
pub struct Coins(BTreeMap<Denom, U256>);

impl Coins {
    pub fn new(coins: impl IntoIterator<Item = Coin>) -> Self {
        let mut map = BTreeMap::new();
        for coin in coins {
            let entry = map.entry(coin.denom).or_insert(U256::ZERO);
            *entry = entry.saturating_add(coin.amount);
        }
        Self(map)
    }

    pub fn amount_of(&self, denom: &str) -> U256 {
        self.0.get(denom).copied().unwrap_or(U256::ZERO)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Coin> + '_ {
        self.0
            .iter()
            .map(|(denom, amount)| Coin::new(denom.clone(), *amount))
    }

    pub fn denoms(&self) -> impl Iterator<Item = &Denom> {
        self.0.keys()
    }
}

impl From<Vec<Coin>> for Coins {
    fn from(coins: Vec<Coin>) -> Self {
        Self::new(coins)
    }
}

impl From<Coins> for Vec<Coin> {
    fn from(coins: Coins) -> Self {
        coins.iter().collect()
    }
}

impl FromIterator<Coin> for Coins {
    fn from_iter<I: IntoIterator<Item = Coin>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Serde helpers for `U256` amounts as base-10 strings
pub mod amount_serde {
    use ruint::aliases::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_str_radix(raw.trim(), 10).map_err(D::Error::custom)
    }
}
