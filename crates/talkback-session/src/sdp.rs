//! Session description handed to the transcoder on stdin.

use std::net::IpAddr;

/// Render the relay session description.
///
/// The `s=` line carries `session_name`, which the transcoder echoes on its
/// diagnostic stream once it has parsed the input and started reading.
pub fn session_description(
    session_name: &str,
    host: IpAddr,
    relay_port: u16,
    payload_type: u8,
) -> String {
    let family = if host.is_ipv6() { "IP6" } else { "IP4" };
    format!(
        "v=0\r\n\
         o=- 0 0 IN {family} {host}\r\n\
         s={session_name}\r\n\
         c=IN {family} {host}\r\n\
         t=0 0\r\n\
         m=audio {relay_port} RTP/AVP {payload_type}\r\n\
         a=rtpmap:{payload_type} opus/48000/2\r\n"
    )
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    #[test]
    fn renders_fixed_template() {
        let sdp = session_description("TalkbackRelay", IpAddr::V4(Ipv4Addr::LOCALHOST), 4000, 111);
        let lines: Vec<&str> = sdp.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(
            lines,
            vec![
                "v=0",
                "o=- 0 0 IN IP4 127.0.0.1",
                "s=TalkbackRelay",
                "c=IN IP4 127.0.0.1",
                "t=0 0",
                "m=audio 4000 RTP/AVP 111",
                "a=rtpmap:111 opus/48000/2",
            ]
        );
    }

    #[test]
    fn only_port_varies_between_sessions() {
        let host = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let a = session_description("TalkbackRelay", host, 4000, 111);
        let b = session_description("TalkbackRelay", host, 4002, 111);
        assert_eq!(a.replace("4000", "4002"), b);
    }

    #[test]
    fn ipv6_loopback_uses_ip6() {
        let sdp = session_description("TalkbackRelay", IpAddr::V6(Ipv6Addr::LOCALHOST), 5000, 96);
        assert!(sdp.contains("c=IN IP6 ::1\r\n"));
        assert!(sdp.contains("a=rtpmap:96 opus/48000/2"));
    }
}
