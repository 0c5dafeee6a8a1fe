pub use entity::{email, email_account, email_analysis, prelude::*, user_preferences};
pub use sea_orm::{
    prelude::{DateTimeWithTimeZone, Expr, Uuid},
    sea_query::OnConflict,
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
};
