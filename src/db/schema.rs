diesel::table! {
    guild_configs (guild_id) {
        guild_id -> Text,
        channel_id -> Nullable<Text>,
        threshold -> Integer,
        nsfw -> Bool,
        selfpin -> Bool,
        dm -> Bool,
        reply_depth -> Integer,
        allowlist -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    pins (id) {
        id -> BigInt,
        guild_id -> Text,
        source_channel_id -> Text,
        source_message_id -> Text,
        dest_channel_id -> Text,
        dest_message_id -> Text,
        author_id -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    identities (guild_id) {
        guild_id -> Text,
        primary_id -> Text,
        primary_token -> Text,
        secondary_id -> Nullable<Text>,
        secondary_token -> Nullable<Text>,
        next_slot -> SmallInt,
        last_used_at -> Nullable<Timestamptz>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    pin_stats (id) {
        id -> BigInt,
        guild_id -> Text,
        user_id -> Text,
        emoji -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(guild_configs, pins, identities, pin_stats);
