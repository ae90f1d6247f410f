const DISCORD_BASE_URL: &str = "https://discord.com";

pub fn message_link(guild_id: u64, channel_id: u64, message_id: u64) -> String {
    format!("{DISCORD_BASE_URL}/channels/{guild_id}/{channel_id}/{message_id}")
}

pub fn user_mention(user_id: u64) -> String {
    format!("<@{user_id}>")
}

/// Links to spoiler attachments stay hidden behind spoiler bars.
pub fn attachment_link(url: &str, spoiler: bool) -> String {
    if spoiler {
        format!("|| {url} ||")
    } else {
        url.to_string()
    }
}

pub fn reply_preface(parent_link: &str) -> String {
    format!("-# ↪ replying to {parent_link}")
}

pub fn jump_footer(source_link: &str, author_id: u64) -> String {
    format!("-# {source_link} · {}", user_mention(author_id))
}

pub fn pin_notice(created_at_unix: i64, guild_name: &str) -> String {
    format!("A message you created <t:{created_at_unix}:R> in **{guild_name}** was pinned!")
}

pub fn preview_text(value: &str) -> String {
    const MAX_PREVIEW_CHARS: usize = 120;
    let mut chars = value.chars();
    let preview: String = chars.by_ref().take(MAX_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{preview}…")
    } else {
        preview
    }
}
