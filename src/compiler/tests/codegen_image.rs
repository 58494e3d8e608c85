use super::*;

#[test]
fn code_images_roundtrip_through_bincode() {
    let result = Tester::new("roundtrip")
        .with_local("x", "")
        .compile("x = x + 5")
        .expect_no_errors();
    let image = &result.compilation.code;
    let bytes = image.to_bytes();
    let restored = crate::compiler::codegen::CodeImage::from_bytes(&bytes).unwrap();
    assert_eq!(*image, restored);
}

#[test]
fn corrupt_images_are_rejected() {
    assert!(crate::compiler::codegen::CodeImage::from_bytes(&[0xff, 0xff, 0xff]).is_err());
}
