//! BSON <-> document model conversion and query translation

use bson::{Bson, Document};
use haven_core::{FeedCursor, FeedItem, FeedQuery, FieldValue, Fields, OrderDirection, CREATED_AT};

pub const ID_FIELD: &str = "_id";

pub fn to_bson(value: &FieldValue) -> Bson {
    match value {
        FieldValue::Null => Bson::Null,
        FieldValue::Bool(b) => Bson::Boolean(*b),
        FieldValue::Integer(i) => Bson::Int64(*i),
        FieldValue::Double(d) => Bson::Double(*d),
        FieldValue::String(s) => Bson::String(s.clone()),
        FieldValue::Timestamp(t) => Bson::DateTime(bson::DateTime::from_chrono(*t)),
    }
}

/// Scalar BSON values only; anything else has no field representation
pub fn from_bson(value: &Bson) -> Option<FieldValue> {
    match value {
        Bson::Null => Some(FieldValue::Null),
        Bson::Boolean(b) => Some(FieldValue::Bool(*b)),
        Bson::Int32(i) => Some(FieldValue::Integer(*i as i64)),
        Bson::Int64(i) => Some(FieldValue::Integer(*i)),
        Bson::Double(d) => Some(FieldValue::Double(*d)),
        Bson::String(s) => Some(FieldValue::String(s.clone())),
        Bson::DateTime(t) => Some(FieldValue::Timestamp(t.to_chrono())),
        _ => None,
    }
}

pub fn to_document(fields: &Fields) -> Document {
    let mut doc = Document::new();
    for (key, value) in fields {
        if key != CREATED_AT && key != ID_FIELD {
            doc.insert(key.clone(), to_bson(value));
        }
    }
    doc
}

pub fn to_item(doc: &Document) -> Option<FeedItem> {
    let id = match doc.get(ID_FIELD)? {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        _ => return None,
    };

    let mut item = FeedItem::new(id);
    for (key, value) in doc {
        if key == ID_FIELD {
            continue;
        }
        if key == CREATED_AT {
            if let Bson::DateTime(t) = value {
                item.created_at = Some(t.to_chrono());
            }
            continue;
        }
        match from_bson(value) {
            Some(v) => {
                item.fields.insert(key.clone(), v);
            }
            None => tracing::debug!("Skipping non-scalar field '{}' on {}", key, item.id),
        }
    }

    Some(item)
}

pub fn id_filter(id: &str) -> Document {
    let mut doc = Document::new();
    doc.insert(ID_FIELD, id);
    doc
}

fn single(field: &str, value: impl Into<Bson>) -> Document {
    let mut doc = Document::new();
    doc.insert(field, value.into());
    doc
}

/// Single write that creates the document and stamps `createdAt` on the server.
///
/// Used with `upsert(true)` on an id filter, so either the whole document lands
/// with its timestamp or nothing does.
pub fn insert_update(fields: &Fields) -> Document {
    let mut update = single("$currentDate", single(CREATED_AT, true));

    let set = to_document(fields);
    if !set.is_empty() {
        update.insert("$setOnInsert", set);
    }
    update
}

/// Filter for one page: equality filter, non-null order key, strictly after the cursor
pub fn page_filter(query: &FeedQuery, after: Option<&FeedCursor>) -> Document {
    let order = query.order_field();
    let mut clauses = Vec::new();

    if let Some(filter) = query.filter() {
        clauses.push(single(&filter.field, to_bson(&filter.value)));
    }

    clauses.push(single(order, single("$ne", Bson::Null)));

    if let Some(cursor) = after {
        let op = match query.direction() {
            OrderDirection::Ascending => "$gt",
            OrderDirection::Descending => "$lt",
        };
        let key = to_bson(cursor.order_key());

        let past_key = single(order, single(op, key.clone()));
        let mut tie = single(order, key);
        tie.insert(ID_FIELD, single(op, cursor.last_id()));

        clauses.push(single(
            "$or",
            Bson::Array(vec![Bson::Document(past_key), Bson::Document(tie)]),
        ));
    }

    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        single(
            "$and",
            Bson::Array(clauses.into_iter().map(Bson::Document).collect()),
        )
    }
}

/// Sort on the order field, then `_id` in the same direction
pub fn page_sort(query: &FeedQuery) -> Document {
    let dir = match query.direction() {
        OrderDirection::Ascending => 1,
        OrderDirection::Descending => -1,
    };

    let mut doc = Document::new();
    doc.insert(query.order_field(), dir);
    doc.insert(ID_FIELD, dir);
    doc
}
