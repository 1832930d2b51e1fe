fn main() -> color_eyre::Result<()> {
	volley_client::main()
}
