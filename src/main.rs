fn main() {
    hemaguard::run()
}
