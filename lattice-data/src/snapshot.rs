//! Snapshot format shared by the server collector and the client bridge.
//!
//! A snapshot maps factory id → cache key → loaded value. On the page it is
//! embedded as
//!
//! ```text
//! <script>(window["VAR"]=window["VAR"]||{}).data={"id":{"key":value}}</script>
//! ```

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

/// Factory id → cache key → value.
pub type CacheData = IndexMap<String, IndexMap<String, Value>>;

/// JSON suitable for inlining in HTML: `</` is written as `<\/` so the data
/// cannot close the surrounding script element.
pub fn jsonify<S>(input: &S) -> Result<String, Error>
where
    S: Serialize + ?Sized,
{
    Ok(serde_json::to_string(input)?.replace("</", "<\\/"))
}

pub(crate) fn script(cache_var: &str, data: &CacheData) -> Result<String, Error> {
    let var = jsonify(cache_var)?;
    Ok(format!(
        "<script>(window[{var}]=window[{var}]||{{}}).data={data}</script>",
        var = var,
        data = jsonify(data)?
    ))
}
