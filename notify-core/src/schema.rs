use diesel::table;

table! {
    notifications (id) {
        id -> BigInt,
        user_id -> BigInt,
        notification_type -> Text,
        message -> Text,
        related_id -> Text,
        metadata -> Nullable<Jsonb>,
        read -> Bool,
        dedup_key -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}
