//! Toxic management commands.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};

use venom_core::{Direction, ToxicPatch, ToxicRecord, ToxicRequest};

use super::http::{base_url, delete, post_json_body};

/// Options shared by `toxic add` and `toxic update`.
#[derive(Debug, Default, PartialEq)]
pub struct ToxicFlags {
    pub name: Option<String>,
    pub stream: Option<Direction>,
    pub toxicity: Option<f32>,
    pub attributes: Map<String, Value>,
}

impl ToxicFlags {
    pub fn parse(args: &[&str]) -> Result<Self> {
        let mut flags = ToxicFlags::default();
        let mut i = 0;
        while i < args.len() {
            match args[i] {
                "-u" | "--upstream" => flags.stream = Some(Direction::Upstream),
                "-d" | "--downstream" => flags.stream = Some(Direction::Downstream),
                "-n" | "--name" => {
                    i += 1;
                    let name = args.get(i).context("-n requires a value")?;
                    flags.name = Some(name.to_string());
                }
                "-t" | "--toxicity" => {
                    i += 1;
                    flags.toxicity = Some(
                        args.get(i)
                            .context("-t requires a value")?
                            .parse()
                            .context("-t must be a number")?,
                    );
                }
                "-a" | "--attribute" => {
                    i += 1;
                    let pair = args.get(i).context("-a requires key=value")?;
                    let (key, value) = parse_attribute(pair)?;
                    flags.attributes.insert(key, value);
                }
                other => bail!("unexpected argument: {}", other),
            }
            i += 1;
        }
        Ok(flags)
    }

    fn attributes(&self) -> Value {
        if self.attributes.is_empty() {
            Value::Null
        } else {
            Value::Object(self.attributes.clone())
        }
    }
}

/// `key=value`; the value is read as JSON when it parses, else as a string.
fn parse_attribute(pair: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = pair.split_once('=') else {
        bail!("attribute must look like key=value (got {})", pair);
    };
    if key.is_empty() {
        bail!("attribute key is empty in {}", pair);
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn print_toxic(verb: &str, t: &ToxicRecord) {
    println!(
        "{} toxic {} ({}, {}, toxicity {}) {}",
        verb, t.name, t.kind, t.stream, t.toxicity, t.attributes
    );
}

pub async fn cmd_toxic_add(port: u16, proxy: &str, kind: &str, args: &[&str]) -> Result<()> {
    let flags = ToxicFlags::parse(args)?;
    let mut req = ToxicRequest::new(kind).attributes(flags.attributes());
    if let Some(name) = flags.name {
        req = req.name(name);
    }
    if let Some(stream) = flags.stream {
        req = req.stream(stream);
    }
    if let Some(toxicity) = flags.toxicity {
        req = req.toxicity(toxicity);
    }

    let t: ToxicRecord =
        post_json_body(&format!("{}/proxies/{}/toxics", base_url(port), proxy), &req).await?;
    print_toxic("Added", &t);
    Ok(())
}

pub async fn cmd_toxic_update(port: u16, proxy: &str, toxic: &str, args: &[&str]) -> Result<()> {
    let flags = ToxicFlags::parse(args)?;
    if flags.name.is_some() || flags.stream.is_some() {
        bail!("a toxic's name and stream cannot be changed; remove and re-add it");
    }
    let patch = ToxicPatch {
        toxicity: flags.toxicity,
        attributes: flags.attributes(),
    };

    let t: ToxicRecord = post_json_body(
        &format!("{}/proxies/{}/toxics/{}", base_url(port), proxy, toxic),
        &patch,
    )
    .await?;
    print_toxic("Updated", &t);
    Ok(())
}

pub async fn cmd_toxic_remove(port: u16, proxy: &str, toxic: &str) -> Result<()> {
    delete(&format!("{}/proxies/{}/toxics/{}", base_url(port), proxy, toxic)).await?;
    println!("Removed toxic {} from {}.", toxic, proxy);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_every_flag() {
        let flags = ToxicFlags::parse(&[
            "-n", "slow", "-u", "-t", "0.5", "-a", "latency=100", "-a", "mode=fast",
        ])
        .unwrap();
        assert_eq!(flags.name.as_deref(), Some("slow"));
        assert_eq!(flags.stream, Some(Direction::Upstream));
        assert_eq!(flags.toxicity, Some(0.5));
        assert_eq!(flags.attributes["latency"], json!(100));
        assert_eq!(flags.attributes["mode"], json!("fast"));
    }

    #[test]
    fn last_stream_flag_wins() {
        let flags = ToxicFlags::parse(&["-u", "-d"]).unwrap();
        assert_eq!(flags.stream, Some(Direction::Downstream));
    }

    #[test]
    fn no_flags_means_no_attributes() {
        let flags = ToxicFlags::parse(&[]).unwrap();
        assert_eq!(flags, ToxicFlags::default());
        assert_eq!(flags.attributes(), Value::Null);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(ToxicFlags::parse(&["-t"]).is_err());
        assert!(ToxicFlags::parse(&["-t", "lots"]).is_err());
        assert!(ToxicFlags::parse(&["-a", "latency"]).is_err());
        assert!(ToxicFlags::parse(&["-a", "=1"]).is_err());
        assert!(ToxicFlags::parse(&["--bogus"]).is_err());
    }

    #[test]
    fn attribute_values_keep_json_types() {
        assert_eq!(parse_attribute("rate=1.5").unwrap().1, json!(1.5));
        assert_eq!(parse_attribute("on=true").unwrap().1, json!(true));
        assert_eq!(parse_attribute("host=a=b").unwrap(), ("host".to_string(), json!("a=b")));
    }
}
