use serde::{Deserialize, Deserializer};

/// `#[serde(deserialize_with)]` hook that reads an explicit `null` the same
/// as a missing key. Pair it with `#[serde(default)]`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
