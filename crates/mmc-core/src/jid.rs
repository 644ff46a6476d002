/// Strip agent and device suffixes from a JID and canonicalize the legacy
/// `c.us` server. Input without a server part yields an empty string.
///
/// `user_1:5@c.us` → `user@s.whatsapp.net`
pub fn normalize_jid(jid: &str) -> String {
    let Some((user_part, server)) = jid.split_once('@') else {
        return String::new();
    };
    let user = user_part.split(':').next().unwrap_or_default();
    let user = user.split('_').next().unwrap_or_default();
    let server = if server == "c.us" {
        "s.whatsapp.net"
    } else {
        server
    };
    format!("{user}@{server}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_device_and_agent() {
        assert_eq!(normalize_jid("1234:12@s.whatsapp.net"), "1234@s.whatsapp.net");
        assert_eq!(normalize_jid("1234_1:3@s.whatsapp.net"), "1234@s.whatsapp.net");
    }

    #[test]
    fn maps_legacy_server() {
        assert_eq!(normalize_jid("1234@c.us"), "1234@s.whatsapp.net");
    }

    #[test]
    fn keeps_group_and_plain() {
        assert_eq!(normalize_jid("self@id"), "self@id");
        assert_eq!(normalize_jid("1203-99@g.us"), "1203-99@g.us");
    }

    #[test]
    fn no_server_is_empty() {
        assert_eq!(normalize_jid("bogus"), "");
    }
}
