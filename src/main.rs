fn main() -> std::io::Result<()> {
    brewdesk_lib::run()
}
