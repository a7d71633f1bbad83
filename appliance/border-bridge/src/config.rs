//! INI configuration loading, mirroring the `[serial]` / `[wifi]` /
//! `[border-router]` / `[metrics]` sections of the original Python
//! bridge's `configparser`-based config file.

use std::net::Ipv6Addr;
use std::path::Path;

use anyhow::{Context, Result};

#[derive(Clone, Debug)]
pub struct MetricWeights {
    pub en: u32,
    pub bw: u32,
    pub etx: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct Ipv6Subnet {
    pub network: Ipv6Addr,
    pub prefix_len: u8,
}

impl std::str::FromStr for Ipv6Subnet {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Ipv6Subnet> {
        let (addr, len) = s
            .split_once('/')
            .with_context(|| format!("subnet {:?} is missing a /prefix-length", s))?;
        Ok(Ipv6Subnet {
            network: addr
                .parse()
                .with_context(|| format!("subnet {:?} has an invalid network address", s))?,
            prefix_len: len
                .parse()
                .with_context(|| format!("subnet {:?} has an invalid prefix length", s))?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub serial_device: String,
    pub wifi_device: String,
    pub wifi_subnet: Ipv6Subnet,
    pub border_router_ipv6: Ipv6Addr,
    pub metrics: MetricWeights,
}

fn section<'a>(ini: &'a ini::Ini, name: &str) -> Result<&'a ini::Properties> {
    ini.section(Some(name))
        .with_context(|| format!("configuration is missing the [{}] section", name))
}

fn required<'a>(props: &'a ini::Properties, section: &str, key: &str) -> Result<&'a str> {
    props
        .get(key)
        .with_context(|| format!("[{}] is missing required key {:?}", section, key))
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<BridgeConfig> {
        let ini = ini::Ini::load_from_file(path)
            .with_context(|| format!("failed to read configuration file {}", path.display()))?;

        let serial = section(&ini, "serial")?;
        let wifi = section(&ini, "wifi")?;
        let border_router = section(&ini, "border-router")?;
        let metrics = section(&ini, "metrics")?;

        Ok(BridgeConfig {
            serial_device: required(serial, "serial", "device")?.to_owned(),
            wifi_device: required(wifi, "wifi", "device")?.to_owned(),
            wifi_subnet: required(wifi, "wifi", "subnet")?
                .parse()
                .context("[wifi] subnet is invalid")?,
            border_router_ipv6: required(border_router, "border-router", "ipv6")?
                .parse()
                .context("[border-router] ipv6 is invalid")?,
            metrics: MetricWeights {
                en: required(metrics, "metrics", "en")?
                    .parse()
                    .context("[metrics] en must be an integer")?,
                bw: required(metrics, "metrics", "bw")?
                    .parse()
                    .context("[metrics] bw must be an integer")?,
                etx: required(metrics, "metrics", "etx")?
                    .parse()
                    .context("[metrics] etx must be an integer")?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_well_formed_config() {
        let mut file = tempfile_with_contents(
            "[serial]\n\
             device = /dev/ttyUSB0\n\
             [wifi]\n\
             device = wlan0\n\
             subnet = 2001:db8::/64\n\
             [border-router]\n\
             ipv6 = 2001:db8::1\n\
             [metrics]\n\
             en = 1\n\
             bw = 2\n\
             etx = 3\n",
        );
        let config = BridgeConfig::load(file.path()).unwrap();
        assert_eq!(config.serial_device, "/dev/ttyUSB0");
        assert_eq!(config.wifi_device, "wlan0");
        assert_eq!(config.wifi_subnet.prefix_len, 64);
        assert_eq!(config.metrics.etx, 3);
        file.flush().unwrap();
    }

    #[test]
    fn missing_section_is_an_error() {
        let file = tempfile_with_contents("[serial]\ndevice = /dev/ttyUSB0\n");
        assert!(BridgeConfig::load(file.path()).is_err());
    }

    fn tempfile_with_contents(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }
}
