#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Asset {
    pub id: i64,
    pub name: String,
    pub asset_type_id: i64,
}
