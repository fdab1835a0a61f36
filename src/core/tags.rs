//! Tag assignment for vouchers.

use crate::{
    entities::{Tag, VoucherTag, tag, voucher_tag},
    errors::Result,
};
use sea_orm::{QueryOrder, Set, prelude::*};
use std::collections::BTreeSet;

/// Replaces the tag set of a voucher. Unknown names are created; blank names
/// and duplicates are ignored.
pub async fn set_tags<C>(db: &C, voucher_id: i64, names: &[String]) -> Result<()>
where
    C: ConnectionTrait,
{
    VoucherTag::delete_many()
        .filter(voucher_tag::Column::VoucherId.eq(voucher_id))
        .exec(db)
        .await?;

    let wanted: BTreeSet<&str> = names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .collect();

    for name in wanted {
        let existing = Tag::find().filter(tag::Column::Name.eq(name)).one(db).await?;
        let tag_id = match existing {
            Some(t) => t.id,
            None => {
                tag::ActiveModel {
                    name: Set(name.to_string()),
                    ..Default::default()
                }
                .insert(db)
                .await?
                .id
            }
        };

        voucher_tag::ActiveModel {
            voucher_id: Set(voucher_id),
            tag_id: Set(tag_id),
        }
        .insert(db)
        .await?;
    }

    Ok(())
}

/// Tag names of a voucher, sorted.
pub async fn get_tags<C>(db: &C, voucher_id: i64) -> Result<Vec<String>>
where
    C: ConnectionTrait,
{
    Ok(Tag::find()
        .inner_join(VoucherTag)
        .filter(voucher_tag::Column::VoucherId.eq(voucher_id))
        .order_by_asc(tag::Column::Name)
        .all(db)
        .await?
        .into_iter()
        .map(|t| t.name)
        .collect())
}
