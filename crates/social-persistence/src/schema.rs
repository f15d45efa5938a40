// Esquema Diesel (SQLite).
// Tablas sociales: users, posts, follows, comments, likes
// Timelines: timelines, timeline_comments
// Ledger de tareas: ledger_sets, ledger_hashes
use diesel::allow_tables_to_appear_in_same_query;
diesel::table! {
    users (id) {
        id -> Text,
        username -> Text,
    }
}
diesel::table! {
    posts (id) {
        id -> Text,
        author -> Text,
        created_ms -> BigInt,
        privacy_type -> Integer,
        privacy_users -> Text,
    }
}
diesel::table! {
    follows (id) {
        id -> Text,
        user_from -> Text,
        user_to -> Text,
        time_ms -> BigInt,
    }
}
diesel::table! {
    comments (id) {
        id -> Text,
        post_id -> Text,
        author -> Text,
        message -> Text,
        created_ms -> BigInt,
    }
}
diesel::table! {
    likes (user_id, post_id) {
        user_id -> Text,
        post_id -> Text,
    }
}
diesel::table! {
    timelines (id) {
        id -> Text,
        user_id -> Text,
        post_id -> Text,
        post_user_id -> Text,
        liked -> Bool,
        time_ms -> BigInt,
    }
}
diesel::table! {
    timeline_comments (timeline_id, comment_id) {
        timeline_id -> Text,
        comment_id -> Text,
        seq -> BigInt,
    }
}
diesel::table! {
    ledger_sets (set_key, member) {
        set_key -> Text,
        member -> Text,
    }
}
diesel::table! {
    ledger_hashes (hash_key, field) {
        hash_key -> Text,
        field -> Text,
        value -> Text,
    }
}
allow_tables_to_appear_in_same_query!(users, posts, follows, comments, likes, timelines, timeline_comments);
