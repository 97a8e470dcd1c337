use crate::error::RemoteError;

/// One supported distribution: a substring of `/etc/issue` and the commands
/// that install chef-solo on it, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsEntry {
    pub pattern:  String,
    pub commands: Vec<String>,
}

/// Maps an `/etc/issue` banner to an install script. Entries are tried in
/// order, so more specific patterns come first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsCatalog {
    entries: Vec<OsEntry>,
}

const RUBYGEMS: [&str; 5] = [
    "sudo mkdir -p /usr/local/src",
    "sudo wget -P /usr/local/src http://rubyforge.org/frs/download.php/69365/rubygems-1.3.6.tgz",
    "sudo tar zxf /usr/local/src/rubygems-1.3.6.tgz -C /usr/local/src",
    "sudo ruby /usr/local/src/rubygems-1.3.6/setup.rb",
    "sudo rm /usr/local/src/rubygems-1.3.6.tgz",
];

fn chef_gem(version: &str) -> Vec<String> {
    vec![
        "sudo gem sources -a http://gems.opscode.com".into(),
        "sudo gem install rake --no-rdoc --no-ri".into(),
        format!("sudo gem install chef --no-rdoc --no-ri --version '= {}'", version),
        format!(
            "sudo ln -sfv $(gem environment gemdir)/gems/chef-{}/bin/chef-solo /usr/bin/chef-solo",
            version
        ),
    ]
}

fn apt(cmd: &str) -> String {
    format!("sh -c 'export DEBIAN_FRONTEND=noninteractive; {}'", cmd)
}

const APT_RUBY: &str = "apt-get install -y ruby irb ri rdoc libyaml-ruby and libzlib-ruby \
                        build-essential libopenssl-ruby ruby1.8-dev wget";

fn ubuntu_script() -> Vec<String> {
    let mut cmds = vec![
        apt("sudo apt-get update -y"),
        apt("sudo apt-get upgrade -y"),
        apt(&format!("sudo {}", APT_RUBY)),
    ];
    cmds.extend(RUBYGEMS.iter().map(|s| s.to_string()));
    cmds.push("sudo ln -sfv /usr/bin/gem1.8 /usr/bin/gem".into());
    cmds.extend(chef_gem("0.8.14"));
    cmds
}

fn debian_script() -> Vec<String> {
    let mut cmds = vec![
        apt("apt-get update -y"),
        apt("apt-get upgrade -y"),
        apt("apt-get install -y sudo"),
        apt(&format!("sudo {}", APT_RUBY)),
    ];
    cmds.extend(RUBYGEMS.iter().map(|s| s.to_string()));
    cmds.push("sudo ln -sfv /usr/bin/gem1.8 /usr/bin/gem".into());
    cmds.extend(chef_gem("0.9.0"));
    cmds
}

fn redhat_script() -> Vec<String> {
    let mut cmds = vec![
        "sudo rpm -Uvh http://download.fedora.redhat.com/pub/epel/5/i386/epel-release-5-3.noarch.rpm".to_string(),
        "sudo rpm -Uvh http://download.elff.bravenet.com/5/i386/elff-release-5-3.noarch.rpm".to_string(),
        "sudo yum install -y ruby ruby-shadow ruby-ri ruby-rdoc gcc gcc-c++ ruby-devel".to_string(),
    ];
    cmds.extend(RUBYGEMS.iter().map(|s| s.to_string()));
    cmds.extend(chef_gem("0.8.14"));
    cmds
}

impl OsCatalog {
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Ubuntu, Debian, Fedora and CentOS.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        for pattern in [
            "Ubuntu 10.04",
            "Ubuntu 9.10",
            "Ubuntu 9.04",
            "Ubuntu 8.10",
            "Ubuntu 8.04",
            "Ubuntu",
        ] {
            catalog.append(pattern, ubuntu_script());
        }
        for pattern in ["Debian GNU/Linux 6.0", "Debian GNU/Linux 5.0", "Debian"] {
            catalog.append(pattern, debian_script());
        }
        catalog.append("Fedora", redhat_script());
        catalog.append("CentOS", redhat_script());
        catalog
    }

    /// Add an entry checked after every existing one.
    pub fn append(&mut self, pattern: impl Into<String>, commands: Vec<String>) -> &mut Self {
        self.entries.push(OsEntry { pattern: pattern.into(), commands });
        self
    }

    /// Add an entry checked before every existing one.
    pub fn prepend(&mut self, pattern: impl Into<String>, commands: Vec<String>) -> &mut Self {
        self.entries.insert(0, OsEntry { pattern: pattern.into(), commands });
        self
    }

    pub fn entries(&self) -> &[OsEntry] {
        &self.entries
    }

    /// The first entry whose pattern occurs in `banner`.
    pub fn resolve(&self, banner: &str) -> Result<&OsEntry, RemoteError> {
        let banner = banner.trim();
        if banner.is_empty() {
            return Err(RemoteError::UnsupportedDistro("<empty /etc/issue>".into()));
        }
        self.entries
            .iter()
            .find(|e| banner.contains(&e.pattern))
            .ok_or_else(|| RemoteError::UnsupportedDistro(banner.to_string()))
    }
}

impl Default for OsCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
