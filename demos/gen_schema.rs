use homeassistant_sensor_bridge::connector::BridgeOptions;

fn main() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(BridgeOptions);
    let path = "schema/bridge.json";

    std::fs::create_dir_all("schema")?;
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &schema)?;

    println!("Wrote schema to: {path}");

    Ok(())
}
