/// Provenance tag attached to every stored belief.
///
/// A source is identified by its `name`/`version` pair within a `kind`
/// (e.g. "forecasting script").
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataSource {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub version: String,
}
