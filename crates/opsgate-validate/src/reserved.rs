//! Reserved-name tables.
//!
//! Account and group names that the broker must never create, modify, or
//! delete, regardless of policy. The tables cover the stock system
//! accounts of the supported distributions plus the service accounts a
//! fleet host commonly carries. Both tables are consulted at request
//! validation time and again by the wrapper gateway.

use crate::error::{ValidationError, ValidationResult};

/// Usernames that may never be managed through the broker.
pub const FORBIDDEN_USERS: &[&str] = &[
    // Core system accounts
    "root", "daemon", "bin", "sys", "sync", "games", "man", "lp", "mail", "news", "uucp", "proxy",
    "www-data", "backup", "list", "irc", "gnats", "nobody", "shutdown", "halt", "operator",
    // systemd and desktop plumbing
    "systemd-network", "systemd-resolve", "systemd-timesync", "systemd-coredump", "messagebus",
    "syslog", "_apt", "tss", "uuidd", "tcpdump", "avahi-autoipd", "usbmux", "rtkit", "dnsmasq",
    "cups-pk-helper", "speech-dispatcher", "whoopsie", "kernoops", "saned", "pulse", "avahi",
    "colord", "hplip", "geoclue", "gdm", "lightdm", "polkitd", "sddm",
    // Daemons and databases
    "sshd", "ftp", "mysql", "mariadb", "postgres", "redis", "mongodb", "elasticsearch", "nginx",
    "apache", "httpd", "tomcat", "jenkins", "gitlab", "gitea", "postfix", "dovecot", "exim",
    "bind", "named", "ntp", "chrony", "snmp", "haproxy", "memcached", "rabbitmq", "zookeeper",
    "kafka", "grafana", "prometheus", "influxdb", "telegraf", "consul", "vault", "nomad", "etcd",
    "openvpn", "wireguard", "squid", "varnish", "unbound", "stunnel", "clamav", "amavis",
    "opendkim", "fail2ban",
    // Orchestration and cloud-image defaults
    "docker", "kubernetes", "kube", "containerd", "ubuntu", "debian", "centos", "fedora", "admin",
    "administrator", "guest", "test", "user", "ec2-user", "cloud-user", "vagrant", "ansible",
    "puppet", "chef", "salt",
    // Monitoring and tooling accounts
    "zabbix", "nagios", "icinga", "munin", "cacti", "splunk", "logstash", "kibana", "fluentd",
    "node_exporter", "deploy", "git", "svn", "bot", "service", "support", "noreply", "security",
    "audit", "abuse", "hostmaster", "webmaster", "postmaster",
];

/// Groupnames that may never be managed through the broker.
///
/// Membership in several of these is equivalent to root; the table errs
/// wide.
pub const FORBIDDEN_GROUPS: &[&str] = &[
    "root", "daemon", "bin", "sys", "adm", "tty", "disk", "lp", "mail", "news", "uucp", "man",
    "proxy", "kmem", "dialout", "fax", "voice", "cdrom", "floppy", "tape", "sudo", "audio", "dip",
    "www-data", "backup", "operator", "list", "irc", "src", "gnats", "shadow", "utmp", "video",
    "sasl", "plugdev", "staff", "games", "nogroup", "systemd-journal", "input", "render", "kvm",
    "docker", "lxd", "wheel", "netdev", "ssl-cert", "ssh", "crontab", "messagebus", "syslog",
];

/// Reject a username present in the reserved-username table.
///
/// # Errors
///
/// Returns [`ValidationError::ReservedUsername`] on a match.
pub fn validate_not_forbidden_user(username: &str) -> ValidationResult<()> {
    if FORBIDDEN_USERS.contains(&username) {
        Err(ValidationError::ReservedUsername(username.to_string()))
    } else {
        Ok(())
    }
}

/// Reject a groupname present in the reserved-group table.
///
/// # Errors
///
/// Returns [`ValidationError::ReservedGroupname`] on a match.
pub fn validate_not_forbidden_group(groupname: &str) -> ValidationResult<()> {
    if FORBIDDEN_GROUPS.contains(&groupname) {
        Err(ValidationError::ReservedGroupname(groupname.to_string()))
    } else {
        Ok(())
    }
}

/// Reject a proposed groupname that collides with a reserved username.
///
/// A group named after a system account invites confusion in sudoers
/// and PAM configuration, so both tables apply to new groups.
///
/// # Errors
///
/// Returns [`ValidationError::UserGroupCollision`] on a match.
pub fn validate_no_user_group_collision(groupname: &str) -> ValidationResult<()> {
    if FORBIDDEN_USERS.contains(&groupname) {
        Err(ValidationError::UserGroupCollision(groupname.to_string()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_sizes() {
        assert!(FORBIDDEN_USERS.len() >= 100);
        assert!(FORBIDDEN_GROUPS.len() >= 35);
    }

    #[test]
    fn test_core_entries_present() {
        for user in ["root", "daemon", "sshd", "nobody", "postgres"] {
            assert!(FORBIDDEN_USERS.contains(&user), "{user}");
        }
        for group in ["sudo", "wheel", "docker", "root", "shadow", "lxd", "adm"] {
            assert!(FORBIDDEN_GROUPS.contains(&group), "{group}");
        }
    }

    #[test]
    fn test_forbidden_user() {
        assert!(validate_not_forbidden_user("alice").is_ok());
        assert!(validate_not_forbidden_user("root").is_err());
        assert!(validate_not_forbidden_user("postgres").is_err());
    }

    #[test]
    fn test_forbidden_group() {
        assert!(validate_not_forbidden_group("devs").is_ok());
        assert!(validate_not_forbidden_group("sudo").is_err());
        assert!(validate_not_forbidden_group("docker").is_err());
    }

    #[test]
    fn test_user_group_collision() {
        // "sshd" is a reserved user but not a reserved group; a group
        // named "sshd" is still rejected.
        assert!(validate_not_forbidden_group("sshd").is_ok());
        assert!(validate_no_user_group_collision("sshd").is_err());
        assert!(validate_no_user_group_collision("devs").is_ok());
    }

    #[test]
    fn test_no_duplicate_entries() {
        let mut users: Vec<&str> = FORBIDDEN_USERS.to_vec();
        users.sort_unstable();
        users.dedup();
        assert_eq!(users.len(), FORBIDDEN_USERS.len());

        let mut groups: Vec<&str> = FORBIDDEN_GROUPS.to_vec();
        groups.sort_unstable();
        groups.dedup();
        assert_eq!(groups.len(), FORBIDDEN_GROUPS.len());
    }
}
