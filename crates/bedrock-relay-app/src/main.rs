fn main() -> anyhow::Result<()> {
	bedrock_relay_app::run()
}
